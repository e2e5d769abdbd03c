//! Property-based tests for the imgdelta CLI

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::config::{CliConfig, CliOverrides};
    use crate::output::OutputFormat;

    fn arb_format() -> impl Strategy<Value = OutputFormat> {
        prop_oneof![
            Just(OutputFormat::Table),
            Just(OutputFormat::Json),
            Just(OutputFormat::Quiet),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Output formats survive a Display/FromStr round trip.
        #[test]
        fn test_output_format_display_parse(format in arb_format()) {
            prop_assert_eq!(format.to_string().parse::<OutputFormat>().unwrap(), format);
        }

        /// A threshold override in (0, 1] always yields a valid config, and
        /// the override wins over the file value.
        #[test]
        fn test_threshold_override(threshold in 0.001f64..=1.0) {
            let overrides = CliOverrides {
                patch_threshold: Some(threshold),
                ..CliOverrides::default()
            };
            let config = CliConfig::default().with_overrides(&overrides);
            prop_assert_eq!(config.packaging.patch_threshold, threshold);
            prop_assert!(config.validate().is_ok());
        }

        /// Thresholds above one are rejected after overriding.
        #[test]
        fn test_threshold_override_out_of_range(threshold in 1.0001f64..100.0) {
            let overrides = CliOverrides {
                patch_threshold: Some(threshold),
                ..CliOverrides::default()
            };
            let config = CliConfig::default().with_overrides(&overrides);
            prop_assert!(config.validate().is_err());
        }
    }
}

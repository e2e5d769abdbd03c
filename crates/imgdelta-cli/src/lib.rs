//! imgdelta - CLI for firmware image update packages
//!
//! This crate provides a command-line interface for:
//! - Building full packages from an unpacked target-files tree
//! - Building incremental packages (patch or full per partition)
//! - Emitting the pre-install verification checks
//! - Inspecting image sizes and hashes

pub mod cli;
pub mod config;
pub mod output;

#[cfg(test)]
mod proptests;

pub use cli::Cli;
pub use config::{CliConfig, CliOverrides};
pub use output::{OutputFormat, OutputFormatter};

use imgdelta_core::{ConfigError, PackageError};

/// Exit codes for CLI operations
///
/// - 0: Success - package built
/// - 1: General error - unspecified error occurred
/// - 2: Invalid input - bad arguments or configuration
/// - 3: Archive error - reading or writing images failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully (exit code 0)
    Success = 0,
    /// General error (exit code 1)
    GeneralError = 1,
    /// Invalid arguments or configuration (exit code 2)
    InvalidInput = 2,
    /// Archive read/write failure (exit code 3)
    ArchiveError = 3,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::ArchiveError => "ARCHIVE_ERROR",
        }
    }

    /// Classify an error returned by a command.
    pub fn for_error(error: &anyhow::Error) -> Self {
        if let Some(e) = error.downcast_ref::<PackageError>() {
            return match e {
                PackageError::Archive(_) => ExitCode::ArchiveError,
                PackageError::Config(_) | PackageError::UnknownMountPoint(_) => {
                    ExitCode::InvalidInput
                }
                PackageError::InvariantViolation(_) => ExitCode::GeneralError,
            };
        }
        if error.downcast_ref::<ConfigError>().is_some() {
            return ExitCode::InvalidInput;
        }
        if error.downcast_ref::<config::CliConfigError>().is_some() {
            return ExitCode::InvalidInput;
        }
        ExitCode::GeneralError
    }
}

#[cfg(test)]
mod exit_code_tests {
    use super::*;
    use imgdelta_core::ArchiveError;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as i32, 0);
        assert_eq!(ExitCode::GeneralError as i32, 1);
        assert_eq!(ExitCode::InvalidInput as i32, 2);
        assert_eq!(ExitCode::ArchiveError as i32, 3);
    }

    #[test]
    fn test_exit_code_names() {
        assert_eq!(ExitCode::Success.name(), "SUCCESS");
        assert_eq!(ExitCode::GeneralError.name(), "GENERAL_ERROR");
        assert_eq!(ExitCode::InvalidInput.name(), "INVALID_INPUT");
        assert_eq!(ExitCode::ArchiveError.name(), "ARCHIVE_ERROR");
    }

    #[test]
    fn test_for_error() {
        let archive = anyhow::Error::new(PackageError::Archive(ArchiveError::InvalidMember(
            "../x".to_string(),
        )));
        assert_eq!(ExitCode::for_error(&archive), ExitCode::ArchiveError);

        let config = anyhow::Error::new(ConfigError::ValidationError("bad".to_string()));
        assert_eq!(ExitCode::for_error(&config), ExitCode::InvalidInput);

        let invariant =
            anyhow::Error::new(PackageError::InvariantViolation("broken".to_string()));
        assert_eq!(ExitCode::for_error(&invariant), ExitCode::GeneralError);

        let other = anyhow::anyhow!("something else");
        assert_eq!(ExitCode::for_error(&other), ExitCode::GeneralError);
    }
}

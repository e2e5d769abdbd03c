//! Patch-versus-full decision engine.
//!
//! Per partition and per run:
//!
//! ```text
//! START --(no source)-------------> FULL
//! START --(hash equal)------------> UNCHANGED
//! START --(hash differs)----------> DIFFING
//! DIFFING --(fail | too large)----> FULL
//! DIFFING --(small enough)--------> PATCH
//! ```

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DeviceTarget, PackagingConfig};
use crate::descriptor::PatchDescriptor;
use crate::diff::DiffProvider;
use crate::error::{ConfigError, PackageError};
use crate::image::ImageAsset;

/// Size bound applied to candidate patches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchPolicy {
    threshold: f64,
}

impl PatchPolicy {
    /// `threshold` is the largest fraction of the target size a patch may
    /// occupy; it must lie in (0, 1].
    pub fn new(threshold: f64) -> Result<Self, ConfigError> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "patch threshold must be in (0, 1], got {threshold}"
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Largest acceptable patch for a target of `target_size` bytes.
    pub fn limit(&self, target_size: u64) -> f64 {
        target_size as f64 * self.threshold
    }

    /// Whether a patch of `patch_size` bytes is worth shipping.
    ///
    /// The bound is inclusive, but a patch never wins when it is at least as
    /// large as the target itself.
    pub fn accepts(&self, patch_size: u64, target_size: u64) -> bool {
        patch_size < target_size && patch_size as f64 <= self.limit(target_size)
    }
}

/// Why a full image was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FullReason {
    /// Nothing installed to patch against
    NoSource,
    /// Full package build; no source is consulted
    FullPackage,
    /// Partition is not eligible for patching
    NotPatchable,
    /// Diff provider could not produce a patch
    DiffFailed,
    /// Patch exceeded the threshold
    PatchTooLarge,
    /// Unchanged, but the partition is configured to always be written
    Rewrite,
}

/// Result of deciding one partition.
#[derive(Debug, Clone)]
pub enum DeltaOutcome {
    /// Source and target hashes match; nothing to ship
    Unchanged,
    /// Ship the whole target image
    FullTransfer {
        image: ImageAsset,
        reason: FullReason,
    },
    /// Ship a patch plus the descriptor the device needs to apply it
    PatchTransfer {
        patch: Bytes,
        descriptor: PatchDescriptor,
    },
}

impl DeltaOutcome {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, DeltaOutcome::Unchanged)
    }

    pub fn is_full(&self) -> bool {
        matches!(self, DeltaOutcome::FullTransfer { .. })
    }

    pub fn is_patch(&self) -> bool {
        matches!(self, DeltaOutcome::PatchTransfer { .. })
    }
}

/// Decides between full and patch transfer for a partition.
#[derive(Debug, Clone, Copy)]
pub struct DeltaEngine {
    policy: PatchPolicy,
}

impl DeltaEngine {
    pub fn new(policy: PatchPolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &PackagingConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(PatchPolicy::new(config.patch_threshold)?))
    }

    pub fn policy(&self) -> &PatchPolicy {
        &self.policy
    }

    /// Decide how `target` reaches a device currently holding `source`.
    ///
    /// The diff provider runs only when both images exist and differ. Its
    /// failures are absorbed and fall back to a full transfer; the only
    /// error returned is an internal invariant violation.
    pub fn decide(
        &self,
        target: &ImageAsset,
        source: Option<&ImageAsset>,
        device: &DeviceTarget,
        provider: &dyn DiffProvider,
    ) -> Result<DeltaOutcome, PackageError> {
        let source = match source {
            Some(source) => source,
            None => return Ok(Self::full(target, FullReason::NoSource)),
        };

        if source.same_content(target) {
            info!(image = target.name(), hash = %target.content_hash(), "Image unchanged");
            return Ok(DeltaOutcome::Unchanged);
        }

        let patch = match provider.diff(source, target) {
            Ok(patch) => patch,
            Err(e) => {
                warn!(
                    image = target.name(),
                    algorithm = provider.algorithm(),
                    error = %e,
                    "Computing difference failed; sending full image"
                );
                return Ok(Self::full(target, FullReason::DiffFailed));
            }
        };

        let patch_size = patch.len() as u64;
        if !self.policy.accepts(patch_size, target.size()) {
            info!(
                image = target.name(),
                patch_size,
                target_size = target.size(),
                limit = self.policy.limit(target.size()),
                "Patch is nearly as large as the target; sending full image"
            );
            return Ok(Self::full(target, FullReason::PatchTooLarge));
        }

        let descriptor = PatchDescriptor::build(device, Some(source), target)?
            .with_patch_ref(target.patch_name());
        debug!(
            image = target.name(),
            patch_size,
            target_size = target.size(),
            descriptor = %descriptor,
            "Patch accepted"
        );
        Ok(DeltaOutcome::PatchTransfer { patch, descriptor })
    }

    /// Decide a partition that is never patched: absent or changed sources
    /// yield a full transfer, equal hashes yield `Unchanged`.
    pub fn decide_without_diff(
        &self,
        target: &ImageAsset,
        source: Option<&ImageAsset>,
    ) -> DeltaOutcome {
        match source {
            None => Self::full(target, FullReason::NoSource),
            Some(source) if source.same_content(target) => {
                info!(image = target.name(), hash = %target.content_hash(), "Image unchanged");
                DeltaOutcome::Unchanged
            }
            Some(_) => Self::full(target, FullReason::NotPatchable),
        }
    }

    fn full(target: &ImageAsset, reason: FullReason) -> DeltaOutcome {
        debug!(image = target.name(), size = target.size(), ?reason, "Full transfer");
        DeltaOutcome::FullTransfer {
            image: target.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::DiffError;

    /// Returns a fixed-size patch and counts invocations.
    struct FixedDiff {
        len: Option<usize>,
        calls: Cell<usize>,
    }

    impl FixedDiff {
        fn returning(len: usize) -> Self {
            Self {
                len: Some(len),
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                len: None,
                calls: Cell::new(0),
            }
        }
    }

    impl DiffProvider for FixedDiff {
        fn algorithm(&self) -> &str {
            "fixed"
        }

        fn diff(&self, _: &ImageAsset, _: &ImageAsset) -> Result<Bytes, DiffError> {
            self.calls.set(self.calls.get() + 1);
            match self.len {
                Some(len) => Ok(Bytes::from(vec![0xAA; len])),
                None => Err(DiffError::Unsupported("test".to_string())),
            }
        }
    }

    fn device() -> DeviceTarget {
        DeviceTarget::new("EMMC", "/dev/block/radio")
    }

    fn engine(threshold: f64) -> DeltaEngine {
        DeltaEngine::new(PatchPolicy::new(threshold).unwrap())
    }

    fn pair(size: usize) -> (ImageAsset, ImageAsset) {
        (
            ImageAsset::new("radio.img", vec![1u8; size]),
            ImageAsset::new("radio.img", vec![2u8; size]),
        )
    }

    #[test]
    fn test_policy_rejects_out_of_range() {
        assert!(PatchPolicy::new(0.0).is_err());
        assert!(PatchPolicy::new(1.5).is_err());
        assert!(PatchPolicy::new(f64::NAN).is_err());
        assert!(PatchPolicy::new(1.0).is_ok());
    }

    #[test]
    fn test_policy_boundary() {
        let policy = PatchPolicy::new(0.95).unwrap();
        assert!(policy.accepts(950, 1000));
        assert!(!policy.accepts(951, 1000));
    }

    #[test]
    fn test_full_threshold_never_accepts_target_size() {
        let policy = PatchPolicy::new(1.0).unwrap();
        assert!(policy.accepts(999, 1000));
        assert!(!policy.accepts(1000, 1000));
        assert!(!policy.accepts(1001, 1000));
        assert!(!policy.accepts(0, 0));
    }

    #[test]
    fn test_scenario_a_no_source() {
        let target = ImageAsset::new("radio.img", vec![3u8; 100]);
        let diff = FixedDiff::returning(1);
        let outcome = engine(0.95).decide(&target, None, &device(), &diff).unwrap();
        match outcome {
            DeltaOutcome::FullTransfer { image, reason } => {
                assert_eq!(image.content_hash(), target.content_hash());
                assert_eq!(reason, FullReason::NoSource);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(diff.calls.get(), 0);
    }

    #[test]
    fn test_scenario_b_unchanged_skips_diff() {
        let blob = vec![9u8; 1000];
        let source = ImageAsset::new("radio.img", blob.clone());
        let target = ImageAsset::new("radio.img", blob);
        let diff = FixedDiff::returning(1);
        let outcome = engine(0.95)
            .decide(&target, Some(&source), &device(), &diff)
            .unwrap();
        assert!(outcome.is_unchanged());
        assert_eq!(diff.calls.get(), 0);
    }

    #[test]
    fn test_scenario_c_small_patch() {
        let (source, target) = pair(1000);
        let diff = FixedDiff::returning(50);
        let outcome = engine(0.95)
            .decide(&target, Some(&source), &device(), &diff)
            .unwrap();
        match outcome {
            DeltaOutcome::PatchTransfer { patch, descriptor } => {
                assert_eq!(patch.len(), 50);
                assert_eq!(descriptor.patch_ref.as_deref(), Some("radio.img.p"));
                assert_eq!(descriptor.source_size, 1000);
                assert_eq!(descriptor.target_hash, target.content_hash());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(diff.calls.get(), 1);
    }

    #[test]
    fn test_scenario_d_large_patch() {
        let (source, target) = pair(1000);
        let diff = FixedDiff::returning(990);
        let outcome = engine(0.95)
            .decide(&target, Some(&source), &device(), &diff)
            .unwrap();
        assert!(matches!(
            outcome,
            DeltaOutcome::FullTransfer {
                reason: FullReason::PatchTooLarge,
                ..
            }
        ));
    }

    #[test]
    fn test_scenario_e_diff_failure() {
        let (source, target) = pair(1000);
        for threshold in [0.1, 0.95, 1.0] {
            let diff = FixedDiff::failing();
            let outcome = engine(threshold)
                .decide(&target, Some(&source), &device(), &diff)
                .unwrap();
            assert!(matches!(
                outcome,
                DeltaOutcome::FullTransfer {
                    reason: FullReason::DiffFailed,
                    ..
                }
            ));
            assert_eq!(diff.calls.get(), 1);
        }
    }

    #[test]
    fn test_decide_without_diff() {
        let (source, target) = pair(64);
        let engine = engine(0.95);
        assert!(matches!(
            engine.decide_without_diff(&target, None),
            DeltaOutcome::FullTransfer {
                reason: FullReason::NoSource,
                ..
            }
        ));
        assert!(engine.decide_without_diff(&target, Some(&target.clone())).is_unchanged());
        assert!(matches!(
            engine.decide_without_diff(&target, Some(&source)),
            DeltaOutcome::FullTransfer {
                reason: FullReason::NotPatchable,
                ..
            }
        ));
    }

    #[test]
    fn test_from_config() {
        let mut config = PackagingConfig::default();
        config.patch_threshold = 0.5;
        let engine = DeltaEngine::from_config(&config).unwrap();
        assert_eq!(engine.policy().threshold(), 0.5);

        config.patch_threshold = 0.0;
        assert!(DeltaEngine::from_config(&config).is_err());
    }
}

//! Property-based tests for imgdelta-core.
//!
//! # Properties Tested
//!
//! - Property 1: Content hash determinism and identity
//! - Property 2: Absent source always yields a full transfer
//! - Property 3: Equal hashes yield `Unchanged` without diffing
//! - Property 4: Patch accepted iff it fits under the threshold
//! - Property 5: Diff failure always yields a full transfer
//! - Property 6: Descriptor field order

#![cfg(test)]

use std::cell::Cell;

use bytes::Bytes;
use proptest::prelude::*;

use crate::config::DeviceTarget;
use crate::decision::{DeltaEngine, DeltaOutcome, FullReason, PatchPolicy};
use crate::descriptor::PatchDescriptor;
use crate::diff::DiffProvider;
use crate::error::DiffError;
use crate::image::ImageAsset;

// =============================================================================
// Generators
// =============================================================================

/// Generate random image content (0 to 4KB).
fn arb_image_content() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..4096)
}

/// Generate two distinct, non-empty images.
fn arb_distinct_pair() -> impl Strategy<Value = (Vec<u8>, Vec<u8>)> {
    (
        prop::collection::vec(any::<u8>(), 1..2048),
        prop::collection::vec(any::<u8>(), 1..2048),
    )
        .prop_filter("images must differ", |(a, b)| a != b)
}

/// Generate a threshold in (0, 1].
fn arb_threshold() -> impl Strategy<Value = f64> {
    prop_oneof![Just(1.0), Just(0.95), Just(0.5), 0.01f64..=1.0]
}

// =============================================================================
// Helpers
// =============================================================================

/// Diff stub returning `len` bytes, or failing when `len` is `None`.
struct StubDiff {
    len: Option<usize>,
    calls: Cell<usize>,
}

impl StubDiff {
    fn new(len: Option<usize>) -> Self {
        Self {
            len,
            calls: Cell::new(0),
        }
    }
}

impl DiffProvider for StubDiff {
    fn algorithm(&self) -> &str {
        "stub"
    }

    fn diff(&self, _: &ImageAsset, _: &ImageAsset) -> Result<Bytes, DiffError> {
        self.calls.set(self.calls.get() + 1);
        self.len
            .map(|len| Bytes::from(vec![0u8; len]))
            .ok_or_else(|| DiffError::Unsupported("stub".to_string()))
    }
}

fn device() -> DeviceTarget {
    DeviceTarget::new("EMMC", "/dev/block/by-name/radio")
}

fn engine(threshold: f64) -> DeltaEngine {
    DeltaEngine::new(PatchPolicy::new(threshold).unwrap())
}

// =============================================================================
// Property 1: Content hash determinism and identity
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Hashing the same bytes twice, in separate assets, gives the same hash.
    #[test]
    fn prop_hash_deterministic(content in arb_image_content()) {
        let a = ImageAsset::new("a.img", content.clone());
        let b = ImageAsset::new("b.img", content);
        prop_assert_eq!(a.content_hash(), a.content_hash());
        prop_assert_eq!(a.content_hash(), b.content_hash());
        prop_assert!(a.same_content(&b));
    }

    /// Different bytes give different hashes.
    #[test]
    fn prop_hash_distinguishes_content((a, b) in arb_distinct_pair()) {
        let a = ImageAsset::new("radio.img", a);
        let b = ImageAsset::new("radio.img", b);
        prop_assert_ne!(a.content_hash(), b.content_hash());
        prop_assert!(!a.same_content(&b));
    }
}

// =============================================================================
// Property 2: Absent source always yields a full transfer
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_no_source_is_full(
        content in arb_image_content(),
        threshold in arb_threshold(),
        patch_len in prop::option::of(0usize..64),
    ) {
        let target = ImageAsset::new("radio.img", content);
        let diff = StubDiff::new(patch_len);
        let outcome = engine(threshold).decide(&target, None, &device(), &diff).unwrap();
        let is_no_source = matches!(
            outcome,
            DeltaOutcome::FullTransfer { reason: FullReason::NoSource, .. }
        );
        prop_assert!(is_no_source);
        prop_assert_eq!(diff.calls.get(), 0);
    }
}

// =============================================================================
// Property 3: Equal hashes yield Unchanged without diffing
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_equal_hash_is_unchanged(
        content in arb_image_content(),
        threshold in arb_threshold(),
    ) {
        let source = ImageAsset::new("radio.img", content.clone());
        let target = ImageAsset::new("radio.img", content);
        let diff = StubDiff::new(Some(1));
        let outcome = engine(threshold)
            .decide(&target, Some(&source), &device(), &diff)
            .unwrap();
        prop_assert!(outcome.is_unchanged());
        prop_assert_eq!(diff.calls.get(), 0);
    }
}

// =============================================================================
// Property 4: Patch accepted iff it fits under the threshold
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// At the exact boundary `floor(size * threshold)` the patch is taken;
    /// one byte more flips the decision.
    #[test]
    fn prop_threshold_boundary(
        (source, target) in arb_distinct_pair(),
        threshold in arb_threshold(),
    ) {
        let source = ImageAsset::new("radio.img", source);
        let target = ImageAsset::new("radio.img", target);
        let limit = (target.size() as f64 * threshold).floor() as u64;

        let at_limit = StubDiff::new(Some(limit as usize));
        let outcome = engine(threshold)
            .decide(&target, Some(&source), &device(), &at_limit)
            .unwrap();
        // A patch as large as the target is never taken, even at threshold 1.0.
        prop_assert_eq!(outcome.is_patch(), limit < target.size());

        let over_limit = StubDiff::new(Some(limit as usize + 1));
        let outcome = engine(threshold)
            .decide(&target, Some(&source), &device(), &over_limit)
            .unwrap();
        prop_assert!(outcome.is_full());
    }

    #[test]
    fn prop_patch_decision_matches_policy(
        (source, target) in arb_distinct_pair(),
        threshold in arb_threshold(),
        patch_len in 0usize..2048,
    ) {
        let source = ImageAsset::new("radio.img", source);
        let target = ImageAsset::new("radio.img", target);
        let diff = StubDiff::new(Some(patch_len));
        let outcome = engine(threshold)
            .decide(&target, Some(&source), &device(), &diff)
            .unwrap();

        let expected = (patch_len as u64) < target.size()
            && patch_len as f64 <= target.size() as f64 * threshold;
        prop_assert_eq!(outcome.is_patch(), expected);
        prop_assert_eq!(diff.calls.get(), 1);

        if let DeltaOutcome::PatchTransfer { patch, descriptor } = outcome {
            prop_assert_eq!(patch.len(), patch_len);
            prop_assert_eq!(descriptor.source_hash, source.content_hash());
            prop_assert_eq!(descriptor.target_hash, target.content_hash());
            prop_assert_eq!(descriptor.patch_ref, Some(target.patch_name()));
        }
    }
}

// =============================================================================
// Property 5: Diff failure always yields a full transfer
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_diff_failure_is_full(
        (source, target) in arb_distinct_pair(),
        threshold in arb_threshold(),
    ) {
        let source = ImageAsset::new("radio.img", source);
        let target = ImageAsset::new("radio.img", target);
        let diff = StubDiff::new(None);
        let outcome = engine(threshold)
            .decide(&target, Some(&source), &device(), &diff)
            .unwrap();
        match outcome {
            DeltaOutcome::FullTransfer { image, reason } => {
                prop_assert_eq!(reason, FullReason::DiffFailed);
                prop_assert_eq!(image.content_hash(), target.content_hash());
            }
            other => prop_assert!(false, "unexpected outcome {:?}", other),
        }
    }
}

// =============================================================================
// Property 6: Descriptor field order
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_descriptor_field_order((source, target) in arb_distinct_pair()) {
        let source = ImageAsset::new("radio.img", source);
        let target = ImageAsset::new("radio.img", target);
        let descriptor = PatchDescriptor::build(&device(), Some(&source), &target)
            .unwrap()
            .with_patch_ref(target.patch_name());

        let rendered = descriptor.to_string();
        let fields: Vec<&str> = rendered.split(':').collect();
        prop_assert_eq!(fields.len(), 7);
        prop_assert_eq!(fields[0], "EMMC");
        prop_assert_eq!(fields[1], "/dev/block/by-name/radio");
        prop_assert_eq!(fields[2], source.size().to_string());
        prop_assert_eq!(fields[3], source.content_hash().to_hex());
        prop_assert_eq!(fields[4], target.size().to_string());
        prop_assert_eq!(fields[5], target.content_hash().to_hex());
        prop_assert_eq!(fields[6], "radio.img.p");
    }
}

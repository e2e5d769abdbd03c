//! Patch descriptors.
//!
//! A descriptor tells the device-side updater which partition to patch and
//! how to verify it before and after. Its string form is a wire format:
//!
//! ```text
//! <type>:<device>:<source size>:<source sha1>:<target size>:<target sha1>[:<patch ref>]
//! ```
//!
//! Hashes are lowercase hex. Changing the field order or encoding breaks the
//! device-side parser.

use std::fmt;

use serde::Serialize;

use crate::config::DeviceTarget;
use crate::error::PackageError;
use crate::image::{ContentHash, ImageAsset};

/// Instructions for patching one partition in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchDescriptor {
    pub device_type: String,
    pub device_ref: String,
    pub source_size: u64,
    pub source_hash: ContentHash,
    pub target_size: u64,
    pub target_hash: ContentHash,
    /// Output member holding the patch bytes, if stored
    pub patch_ref: Option<String>,
}

impl PatchDescriptor {
    /// Build a descriptor for patching `source` into `target` on `device`.
    ///
    /// Only valid once the decision engine has chosen a patch: a missing
    /// source or identical hashes is an invariant violation and aborts the
    /// run.
    pub fn build(
        device: &DeviceTarget,
        source: Option<&ImageAsset>,
        target: &ImageAsset,
    ) -> Result<Self, PackageError> {
        let source = source.ok_or_else(|| {
            PackageError::InvariantViolation(format!(
                "patch descriptor for {} requires a source image",
                target.name()
            ))
        })?;

        let source_hash = source.content_hash();
        let target_hash = target.content_hash();
        if source_hash == target_hash {
            return Err(PackageError::InvariantViolation(format!(
                "patch descriptor for {} requested for unchanged content {}",
                target.name(),
                target_hash
            )));
        }

        Ok(Self {
            device_type: device.fs_type.clone(),
            device_ref: device.device.clone(),
            source_size: source.size(),
            source_hash,
            target_size: target.size(),
            target_hash,
            patch_ref: None,
        })
    }

    /// Attach the member name the patch is stored under.
    pub fn with_patch_ref(mut self, patch_ref: impl Into<String>) -> Self {
        self.patch_ref = Some(patch_ref.into());
        self
    }

    /// Partition spec without the patch reference.
    ///
    /// This is the form the device uses to check whether a partition
    /// currently holds either the source or the target content.
    pub fn partition_spec(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            self.device_type,
            self.device_ref,
            self.source_size,
            self.source_hash,
            self.target_size,
            self.target_hash
        )
    }
}

impl fmt::Display for PatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.partition_spec())?;
        if let Some(patch_ref) = &self.patch_ref {
            write!(f, ":{patch_ref}")?;
        }
        Ok(())
    }
}

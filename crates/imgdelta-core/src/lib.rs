//! # imgdelta-core
//!
//! Delta update packaging for device firmware images.
//!
//! This crate handles:
//! - Content identity of images (size and SHA-1, computed once)
//! - Deciding whether a partition ships as a full image or a binary patch
//! - Patch descriptors consumed by the device-side updater
//! - Full and incremental packaging flows over the configured partitions
//!
//! The binary diff algorithm, archive formats and install-script syntax are
//! collaborators behind the [`DiffProvider`], [`ArchiveReader`],
//! [`ArchiveWriter`] and [`InstructionSink`] traits.
//!
//! ## Safety
//!
//! A wrong decision bricks a device or wastes bandwidth:
//! - Unchanged partitions are detected by hash before any diff is attempted
//! - Diff failures and oversized patches always fall back to a full image
//! - A patch is never accepted unless it is strictly smaller than the target
//! - Each partition's bytes and statements are emitted together or not at all

pub mod archive;
pub mod config;
pub mod decision;
pub mod descriptor;
pub mod diff;
pub mod error;
pub mod image;
pub mod instruction;
pub mod packager;
#[cfg(test)]
mod proptests;

// Re-export main types for convenience
pub use archive::{ArchiveReader, ArchiveWriter, DirArchive, MemoryArchive};
pub use config::{
    DeviceTarget, DiffConfig, PackagingConfig, PartitionKind, PartitionSpec,
    DEFAULT_PATCH_THRESHOLD,
};
pub use decision::{DeltaEngine, DeltaOutcome, FullReason, PatchPolicy};
pub use descriptor::PatchDescriptor;
pub use diff::{DiffProvider, ExternalDiff};
pub use error::{ArchiveError, ConfigError, DiffError, PackageError};
pub use image::{ContentHash, ImageAsset};
pub use instruction::{Instruction, InstructionSink};
pub use packager::{PackageMode, PackageReport, Packager, PartitionAction, PartitionReport};

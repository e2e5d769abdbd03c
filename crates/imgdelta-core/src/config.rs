//! Configuration for a packaging run.
//!
//! The whole record is supplied by the caller; the engine holds no global
//! state. Defaults describe a device with a bootloader, a radio and a
//! secondary CDMA radio stored under `RADIO/` in the target-files archive.
//!
//! # Example TOML
//!
//! ```toml
//! patch_threshold = 0.95
//!
//! [diff]
//! algorithm = "bsdiff"
//! args = ["{source}", "{target}", "{patch}"]
//!
//! [fstab."/radio"]
//! fs_type = "EMMC"
//! device = "/dev/block/platform/omap/omap_hsmmc.0/by-name/radio"
//!
//! [[partitions]]
//! name = "radio"
//! member = "RADIO/radio.img"
//! output_name = "radio.img"
//! kind = { type = "raw_image", mount_point = "/radio" }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PackageError};

/// Default patch threshold: a patch may use at most 95% of the target size.
pub const DEFAULT_PATCH_THRESHOLD: f64 = 0.95;

/// Placeholder replaced by the source scratch file path.
pub const SOURCE_PLACEHOLDER: &str = "{source}";
/// Placeholder replaced by the target scratch file path.
pub const TARGET_PLACEHOLDER: &str = "{target}";
/// Placeholder replaced by the patch output path.
pub const PATCH_PLACEHOLDER: &str = "{patch}";

/// Options for one packaging run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagingConfig {
    /// Largest fraction of the target size a patch may occupy
    #[serde(default = "default_patch_threshold")]
    pub patch_threshold: f64,

    /// Diff program settings
    #[serde(default)]
    pub diff: DiffConfig,

    /// Mount point to block device table
    #[serde(default = "default_fstab")]
    pub fstab: BTreeMap<String, DeviceTarget>,

    /// Partitions handled by this run, in emission order
    #[serde(default = "default_partitions")]
    pub partitions: Vec<PartitionSpec>,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            patch_threshold: default_patch_threshold(),
            diff: DiffConfig::default(),
            fstab: default_fstab(),
            partitions: default_partitions(),
        }
    }
}

impl PackagingConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check value ranges and cross references.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.patch_threshold > 0.0 && self.patch_threshold <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "patch_threshold must be in (0, 1], got {}",
                self.patch_threshold
            )));
        }

        if self.diff.algorithm.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "diff.algorithm cannot be empty".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for partition in &self.partitions {
            if partition.name.is_empty() || partition.member.is_empty() {
                return Err(ConfigError::ValidationError(
                    "partition name and member cannot be empty".to_string(),
                ));
            }
            if partition.output_name.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "partition {} has an empty output_name",
                    partition.name
                )));
            }
            if !seen.insert(partition.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate partition {}",
                    partition.name
                )));
            }
            for mount_point in partition.kind.mount_points() {
                if !self.fstab.contains_key(mount_point) {
                    return Err(ConfigError::ValidationError(format!(
                        "partition {} references unknown mount point {}",
                        partition.name, mount_point
                    )));
                }
            }
        }

        let mut members = BTreeSet::new();
        for member in self.output_members() {
            if !members.insert(member.clone()) {
                return Err(ConfigError::ValidationError(format!(
                    "output member {member} is written by more than one partition"
                )));
            }
        }

        Ok(())
    }

    /// Every member name a package built from this config may contain:
    /// each partition's `output_name`, plus `<output_name>.p` for partitions
    /// that can ship as a patch.
    pub fn output_members(&self) -> Vec<String> {
        let mut members = Vec::with_capacity(self.partitions.len() * 2);
        for partition in &self.partitions {
            members.push(partition.output_name.clone());
            if partition.kind.is_patchable() {
                members.push(format!("{}.p", partition.output_name));
            }
        }
        members
    }

    /// Resolve a logical mount point to its block device.
    pub fn device_for(&self, mount_point: &str) -> Result<&DeviceTarget, PackageError> {
        self.fstab
            .get(mount_point)
            .ok_or_else(|| PackageError::UnknownMountPoint(mount_point.to_string()))
    }
}

/// External binary diff program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Algorithm name, also the default program name
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Program to run (defaults to `algorithm`)
    #[serde(default)]
    pub program: Option<String>,

    /// Arguments, with `{source}`, `{target}` and `{patch}` placeholders
    #[serde(default = "default_diff_args")]
    pub args: Vec<String>,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            program: None,
            args: default_diff_args(),
        }
    }
}

impl DiffConfig {
    /// Program that will actually be executed.
    pub fn program(&self) -> &str {
        self.program.as_deref().unwrap_or(&self.algorithm)
    }
}

/// Block device behind a mount point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTarget {
    /// Partition type understood by the device updater (e.g. `EMMC`)
    pub fs_type: String,
    /// Device node path
    pub device: String,
}

impl DeviceTarget {
    pub fn new(fs_type: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            fs_type: fs_type.into(),
            device: device.into(),
        }
    }
}

/// One flashable partition image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSpec {
    /// Short name used in logs and reports
    pub name: String,
    /// Member name inside the target-files archive
    pub member: String,
    /// Member name inside the output package
    pub output_name: String,
    /// How the partition is written on the device
    pub kind: PartitionKind,
    /// Omit the partition when source and target hashes match
    #[serde(default = "default_true")]
    pub skip_unchanged: bool,
}

/// Installation method for a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionKind {
    /// Raw partition image; eligible for binary patching
    RawImage { mount_point: String },
    /// Two-stage bootloader written by a vendor routine
    Bootloader {
        xloader_mount: String,
        sbl_mount: String,
    },
    /// Secondary modem updated by a vendor routine
    CdmaModem,
}

impl PartitionKind {
    /// Mount points this kind needs resolved.
    pub fn mount_points(&self) -> Vec<&str> {
        match self {
            PartitionKind::RawImage { mount_point } => vec![mount_point.as_str()],
            PartitionKind::Bootloader {
                xloader_mount,
                sbl_mount,
            } => vec![xloader_mount.as_str(), sbl_mount.as_str()],
            PartitionKind::CdmaModem => Vec::new(),
        }
    }

    /// Whether the partition may be shipped as a patch.
    pub fn is_patchable(&self) -> bool {
        matches!(self, PartitionKind::RawImage { .. })
    }
}

fn default_patch_threshold() -> f64 {
    DEFAULT_PATCH_THRESHOLD
}

fn default_algorithm() -> String {
    "bsdiff".to_string()
}

fn default_diff_args() -> Vec<String> {
    vec![
        SOURCE_PLACEHOLDER.to_string(),
        TARGET_PLACEHOLDER.to_string(),
        PATCH_PLACEHOLDER.to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_fstab() -> BTreeMap<String, DeviceTarget> {
    const BY_NAME: &str = "/dev/block/platform/omap/omap_hsmmc.0/by-name";
    let mut fstab = BTreeMap::new();
    fstab.insert(
        "/radio".to_string(),
        DeviceTarget::new("EMMC", format!("{BY_NAME}/radio")),
    );
    fstab.insert(
        "/xloader".to_string(),
        DeviceTarget::new("EMMC", format!("{BY_NAME}/xloader")),
    );
    fstab.insert(
        "/sbl".to_string(),
        DeviceTarget::new("EMMC", format!("{BY_NAME}/sbl")),
    );
    fstab
}

fn default_partitions() -> Vec<PartitionSpec> {
    vec![
        PartitionSpec {
            name: "bootloader".to_string(),
            member: "RADIO/bootloader.img".to_string(),
            output_name: "bootloader.img".to_string(),
            kind: PartitionKind::Bootloader {
                xloader_mount: "/xloader".to_string(),
                sbl_mount: "/sbl".to_string(),
            },
            skip_unchanged: true,
        },
        PartitionSpec {
            name: "radio".to_string(),
            member: "RADIO/radio.img".to_string(),
            output_name: "radio.img".to_string(),
            kind: PartitionKind::RawImage {
                mount_point: "/radio".to_string(),
            },
            skip_unchanged: true,
        },
        PartitionSpec {
            name: "radio-cdma".to_string(),
            member: "RADIO/radio-cdma.img".to_string(),
            output_name: "radio-cdma.img".to_string(),
            kind: PartitionKind::CdmaModem,
            skip_unchanged: true,
        },
    ]
}

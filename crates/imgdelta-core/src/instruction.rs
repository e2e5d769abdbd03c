//! Install-script payloads.
//!
//! The engine only decides what each statement carries; rendering them in a
//! particular updater script syntax is the sink's business.

use serde::Serialize;

use crate::descriptor::PatchDescriptor;

/// One install-script statement payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// Progress message shown on the device
    Print { message: String },

    /// Flash a packaged image onto a raw partition
    WriteRawImage { mount_point: String, member: String },

    /// Patch a partition in place
    ApplyPatch { descriptor: PatchDescriptor },

    /// Abort unless the partition holds the source or target content
    PatchCheck { spec: String },

    /// Abort unless the cache has room for `bytes` of scratch data
    CacheFreeSpaceCheck { bytes: u64 },

    /// Write the two-stage bootloader through the vendor routine
    WriteBootloader {
        member: String,
        xloader_device: String,
        sbl_device: String,
    },

    /// Update the secondary modem through the vendor routine
    UpdateCdmaModem { member: String },
}

impl Instruction {
    pub fn print(message: impl Into<String>) -> Self {
        Instruction::Print {
            message: message.into(),
        }
    }

    /// Positional arguments of an apply-patch statement.
    ///
    /// Layout: partition spec, target file (`-` for the partition itself),
    /// target size, target hash, source hash, patch member.
    pub fn apply_patch_args(descriptor: &PatchDescriptor) -> Vec<String> {
        vec![
            descriptor.partition_spec(),
            "-".to_string(),
            descriptor.target_size.to_string(),
            descriptor.target_hash.to_hex(),
            descriptor.source_hash.to_hex(),
            descriptor.patch_ref.clone().unwrap_or_default(),
        ]
    }
}

/// Receives statements in emission order.
pub trait InstructionSink {
    fn push(&mut self, instruction: Instruction);
}

impl InstructionSink for Vec<Instruction> {
    fn push(&mut self, instruction: Instruction) {
        Vec::push(self, instruction);
    }
}

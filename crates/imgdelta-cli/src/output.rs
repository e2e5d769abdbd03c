//! Output formatting for CLI results
//!
//! Supports three output formats:
//! - Table: Human-readable tables (default)
//! - JSON: Structured JSON for scripting and automation
//! - Quiet: Minimal output, exit codes only

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use imgdelta_core::{ContentHash, ImageAsset, Instruction, PackageReport, PartitionAction};
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for scripting
    Json,
    /// Minimal output - exit codes only
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Size and hash of one inspected image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub name: String,
    pub size: u64,
    pub sha1: ContentHash,
}

impl From<&ImageAsset> for ImageInfo {
    fn from(image: &ImageAsset) -> Self {
        Self {
            name: image.name().to_string(),
            size: image.size(),
            sha1: image.content_hash(),
        }
    }
}

/// JSON payload for package commands.
#[derive(Serialize)]
struct PackageOutput<'a> {
    report: &'a PackageReport,
    instructions: &'a [Instruction],
}

/// Formats output for different modes
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Format a package report together with its instructions
    pub fn format_package(&self, report: &PackageReport, instructions: &[Instruction]) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut out = self.report_table(report);
                if !instructions.is_empty() {
                    out.push('\n');
                    out.push_str(&self.instructions_table(instructions));
                }
                out
            }
            OutputFormat::Json => self.to_json(&PackageOutput {
                report,
                instructions,
            }),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format verification checks
    pub fn format_instructions(&self, instructions: &[Instruction]) -> String {
        match self.format {
            OutputFormat::Table if instructions.is_empty() => "No checks required".to_string(),
            OutputFormat::Table => self.instructions_table(instructions),
            OutputFormat::Json => self.to_json(&instructions),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format image details
    pub fn format_images(&self, images: &[ImageInfo]) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Image", "Size", "SHA-1"]);
                for image in images {
                    table.add_row(vec![
                        image.name.clone(),
                        image.size.to_string(),
                        image.sha1.to_hex(),
                    ]);
                }
                table.to_string()
            }
            OutputFormat::Json => self.to_json(&images),
            OutputFormat::Quiet => String::new(),
        }
    }

    fn report_table(&self, report: &PackageReport) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Partition", "Action", "Target Size", "Written"]);
        for entry in &report.partitions {
            let action = match &entry.action {
                PartitionAction::Missing => "missing".to_string(),
                PartitionAction::Unchanged => "unchanged".to_string(),
                PartitionAction::Full { reason } => {
                    format!("full ({})", snake_case(reason))
                }
                PartitionAction::Patch { patch_size, ratio } => {
                    format!("patch {} bytes ({:.1}%)", patch_size, ratio * 100.0)
                }
            };
            table.add_row(vec![
                entry.partition.clone(),
                action,
                entry
                    .target_size
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                entry.written.join(", "),
            ]);
        }
        format!(
            "{:?} package, threshold {}, diff {}\n{}",
            report.mode, report.patch_threshold, report.algorithm, table
        )
    }

    fn instructions_table(&self, instructions: &[Instruction]) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Op", "Arguments"]);
        for instruction in instructions {
            let (op, args) = match instruction {
                Instruction::Print { message } => ("print", vec![message.clone()]),
                Instruction::WriteRawImage {
                    mount_point,
                    member,
                } => ("write_raw_image", vec![member.clone(), mount_point.clone()]),
                Instruction::ApplyPatch { descriptor } => {
                    ("apply_patch", Instruction::apply_patch_args(descriptor))
                }
                Instruction::PatchCheck { spec } => ("patch_check", vec![spec.clone()]),
                Instruction::CacheFreeSpaceCheck { bytes } => {
                    ("cache_free_space_check", vec![bytes.to_string()])
                }
                Instruction::WriteBootloader {
                    member,
                    xloader_device,
                    sbl_device,
                } => (
                    "write_bootloader",
                    vec![member.clone(), xloader_device.clone(), sbl_device.clone()],
                ),
                Instruction::UpdateCdmaModem { member } => {
                    ("update_cdma_modem", vec![member.clone()])
                }
            };
            table.add_row(vec![op.to_string(), args.join("\n")]);
        }
        table.to_string()
    }

    fn to_json<T: Serialize + ?Sized>(&self, data: &T) -> String {
        serde_json::to_string_pretty(data)
            .unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
    }
}

/// Render a unit enum variant through its serde name.
fn snake_case<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

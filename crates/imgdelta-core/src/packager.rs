//! Packaging flows.
//!
//! Drives the decision engine over every configured partition and hands the
//! chosen artifact and its install statements to the output collaborators.
//! Each partition is committed as one unit: every member is written before
//! any of its statements reach the sink.

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::config::{PackagingConfig, PartitionKind, PartitionSpec};
use crate::decision::{DeltaEngine, DeltaOutcome, FullReason};
use crate::descriptor::PatchDescriptor;
use crate::diff::DiffProvider;
use crate::error::PackageError;
use crate::image::{ContentHash, ImageAsset};
use crate::instruction::{Instruction, InstructionSink};

/// Kind of package being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageMode {
    Full,
    Incremental,
}

/// What happened to one partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PartitionAction {
    /// Target archive has no image for this partition
    Missing,
    /// Source and target match; nothing emitted
    Unchanged,
    /// Whole image shipped
    Full { reason: FullReason },
    /// Patch shipped
    Patch { patch_size: u64, ratio: f64 },
}

/// Per-partition summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionReport {
    pub partition: String,
    #[serde(flatten)]
    pub action: PartitionAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_hash: Option<ContentHash>,
    /// Output members written for this partition
    pub written: Vec<String>,
    pub bytes_written: u64,
}

impl PartitionReport {
    fn new(partition: &PartitionSpec, action: PartitionAction, target: Option<&ImageAsset>) -> Self {
        Self {
            partition: partition.name.clone(),
            action,
            target_size: target.map(ImageAsset::size),
            target_hash: target.map(ImageAsset::content_hash),
            written: Vec::new(),
            bytes_written: 0,
        }
    }
}

/// Summary of a packaging run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageReport {
    pub mode: PackageMode,
    pub patch_threshold: f64,
    pub algorithm: String,
    pub partitions: Vec<PartitionReport>,
}

impl PackageReport {
    pub fn partition(&self, name: &str) -> Option<&PartitionReport> {
        self.partitions.iter().find(|p| p.partition == name)
    }

    pub fn bytes_written(&self) -> u64 {
        self.partitions.iter().map(|p| p.bytes_written).sum()
    }
}

/// Writes and statements for a single partition, committed together.
#[derive(Debug, Default)]
struct PendingUpdate {
    writes: Vec<(String, Bytes)>,
    instructions: Vec<Instruction>,
}

impl PendingUpdate {
    fn commit(
        self,
        writer: &mut dyn ArchiveWriter,
        sink: &mut dyn InstructionSink,
        report: &mut PartitionReport,
    ) -> Result<(), PackageError> {
        for (member, data) in &self.writes {
            writer.write(member, data)?;
            report.written.push(member.clone());
            report.bytes_written += data.len() as u64;
        }
        for instruction in self.instructions {
            sink.push(instruction);
        }
        Ok(())
    }
}

/// Builds install packages for the configured partitions.
pub struct Packager<D> {
    config: PackagingConfig,
    engine: DeltaEngine,
    diff: D,
}

impl<D: DiffProvider> Packager<D> {
    /// Validate `config` and create a packager using `diff` for patches.
    pub fn new(config: PackagingConfig, diff: D) -> Result<Self, PackageError> {
        config.validate()?;
        let engine = DeltaEngine::from_config(&config)?;
        Ok(Self {
            config,
            engine,
            diff,
        })
    }

    /// Package every present partition as a full image.
    pub fn package_full(
        &self,
        target: &dyn ArchiveReader,
        writer: &mut dyn ArchiveWriter,
        sink: &mut dyn InstructionSink,
    ) -> Result<PackageReport, PackageError> {
        let mut report = self.report(PackageMode::Full);

        for partition in &self.config.partitions {
            let image = match load_image(target, partition)? {
                Some(image) => image,
                None => {
                    info!(
                        partition = %partition.name,
                        member = %partition.member,
                        "No image in target archive; skipping install"
                    );
                    report
                        .partitions
                        .push(PartitionReport::new(partition, PartitionAction::Missing, None));
                    continue;
                }
            };

            let reason = FullReason::FullPackage;
            let mut entry =
                PartitionReport::new(partition, PartitionAction::Full { reason }, Some(&image));
            self.full_update(partition, &image)?
                .commit(writer, sink, &mut entry)?;
            info!(partition = %partition.name, size = image.size(), "Packaged full image");
            report.partitions.push(entry);
        }

        Ok(report)
    }

    /// Emit the pre-install checks for an incremental package.
    ///
    /// For every patchable partition whose image changed, the device must
    /// have cache space for the source image and the partition must hold
    /// either the source or the target content. Returns the partitions
    /// checked.
    pub fn verify_incremental(
        &self,
        source: &dyn ArchiveReader,
        target: &dyn ArchiveReader,
        sink: &mut dyn InstructionSink,
    ) -> Result<Vec<String>, PackageError> {
        let mut checked = Vec::new();

        for partition in &self.config.partitions {
            let mount_point = match &partition.kind {
                PartitionKind::RawImage { mount_point } => mount_point,
                _ => continue,
            };
            let (target_image, source_image) = match (
                load_image(target, partition)?,
                load_image(source, partition)?,
            ) {
                (Some(t), Some(s)) => (t, s),
                _ => {
                    debug!(partition = %partition.name, "Nothing to verify");
                    continue;
                }
            };
            if source_image.same_content(&target_image) {
                continue;
            }

            let device = self.config.device_for(mount_point)?;
            let descriptor = PatchDescriptor::build(device, Some(&source_image), &target_image)?;
            sink.push(Instruction::CacheFreeSpaceCheck {
                bytes: source_image.size(),
            });
            sink.push(Instruction::PatchCheck {
                spec: descriptor.partition_spec(),
            });
            debug!(partition = %partition.name, spec = %descriptor.partition_spec(), "Added patch check");
            checked.push(partition.name.clone());
        }

        Ok(checked)
    }

    /// Package the changes needed to move a device from `source` to
    /// `target`.
    pub fn package_incremental(
        &self,
        source: &dyn ArchiveReader,
        target: &dyn ArchiveReader,
        writer: &mut dyn ArchiveWriter,
        sink: &mut dyn InstructionSink,
    ) -> Result<PackageReport, PackageError> {
        let mut report = self.report(PackageMode::Incremental);

        for partition in &self.config.partitions {
            let target_image = match load_image(target, partition)? {
                Some(image) => image,
                None => {
                    info!(
                        partition = %partition.name,
                        member = %partition.member,
                        "No image in target archive; skipping install"
                    );
                    report
                        .partitions
                        .push(PartitionReport::new(partition, PartitionAction::Missing, None));
                    continue;
                }
            };
            let source_image = load_image(source, partition)?;

            let outcome = match &partition.kind {
                PartitionKind::RawImage { mount_point } => {
                    let device = self.config.device_for(mount_point)?;
                    self.engine
                        .decide(&target_image, source_image.as_ref(), device, &self.diff)?
                }
                _ => self
                    .engine
                    .decide_without_diff(&target_image, source_image.as_ref()),
            };

            let entry = self.emit(partition, &target_image, outcome, writer, sink)?;
            report.partitions.push(entry);
        }

        Ok(report)
    }

    fn emit(
        &self,
        partition: &PartitionSpec,
        target: &ImageAsset,
        outcome: DeltaOutcome,
        writer: &mut dyn ArchiveWriter,
        sink: &mut dyn InstructionSink,
    ) -> Result<PartitionReport, PackageError> {
        match outcome {
            DeltaOutcome::Unchanged if partition.skip_unchanged => {
                info!(partition = %partition.name, "Image unchanged; skipping");
                Ok(PartitionReport::new(
                    partition,
                    PartitionAction::Unchanged,
                    Some(target),
                ))
            }
            DeltaOutcome::Unchanged => {
                let reason = FullReason::Rewrite;
                let mut entry =
                    PartitionReport::new(partition, PartitionAction::Full { reason }, Some(target));
                self.full_update(partition, target)?
                    .commit(writer, sink, &mut entry)?;
                info!(partition = %partition.name, "Image unchanged; rewriting anyway");
                Ok(entry)
            }
            DeltaOutcome::FullTransfer { image, reason } => {
                let mut entry =
                    PartitionReport::new(partition, PartitionAction::Full { reason }, Some(&image));
                self.full_update(partition, &image)?
                    .commit(writer, sink, &mut entry)?;
                info!(partition = %partition.name, size = image.size(), ?reason, "Packaged full image");
                Ok(entry)
            }
            DeltaOutcome::PatchTransfer { patch, descriptor } => {
                let patch_size = patch.len() as u64;
                let ratio = if target.size() == 0 {
                    0.0
                } else {
                    patch_size as f64 / target.size() as f64
                };
                let mut entry = PartitionReport::new(
                    partition,
                    PartitionAction::Patch { patch_size, ratio },
                    Some(target),
                );
                self.patch_update(partition, patch, descriptor)?
                    .commit(writer, sink, &mut entry)?;
                info!(partition = %partition.name, patch_size, ratio, "Packaged patch");
                Ok(entry)
            }
        }
    }

    fn full_update(
        &self,
        partition: &PartitionSpec,
        image: &ImageAsset,
    ) -> Result<PendingUpdate, PackageError> {
        let mut update = PendingUpdate::default();
        update
            .writes
            .push((image.name().to_string(), image.bytes().clone()));
        update
            .instructions
            .push(Instruction::print(format!("Writing {}...", partition.name)));

        let install = match &partition.kind {
            PartitionKind::RawImage { mount_point } => Instruction::WriteRawImage {
                mount_point: mount_point.clone(),
                member: image.name().to_string(),
            },
            PartitionKind::Bootloader {
                xloader_mount,
                sbl_mount,
            } => Instruction::WriteBootloader {
                member: image.name().to_string(),
                xloader_device: self.config.device_for(xloader_mount)?.device.clone(),
                sbl_device: self.config.device_for(sbl_mount)?.device.clone(),
            },
            PartitionKind::CdmaModem => Instruction::UpdateCdmaModem {
                member: image.name().to_string(),
            },
        };
        update.instructions.push(install);
        Ok(update)
    }

    fn patch_update(
        &self,
        partition: &PartitionSpec,
        patch: Bytes,
        descriptor: PatchDescriptor,
    ) -> Result<PendingUpdate, PackageError> {
        let patch_ref = descriptor.patch_ref.clone().ok_or_else(|| {
            PackageError::InvariantViolation(format!(
                "patch for {} has no patch reference",
                partition.name
            ))
        })?;

        let mut update = PendingUpdate::default();
        update.writes.push((patch_ref, patch));
        update
            .instructions
            .push(Instruction::print(format!("Patching {}...", partition.name)));
        update.instructions.push(Instruction::ApplyPatch { descriptor });
        Ok(update)
    }

    fn report(&self, mode: PackageMode) -> PackageReport {
        PackageReport {
            mode,
            patch_threshold: self.engine.policy().threshold(),
            algorithm: self.diff.algorithm().to_string(),
            partitions: Vec::new(),
        }
    }
}

/// Read a partition image, named by its output member.
fn load_image(
    archive: &dyn ArchiveReader,
    partition: &PartitionSpec,
) -> Result<Option<ImageAsset>, PackageError> {
    Ok(archive
        .read(&partition.member)?
        .map(|data| ImageAsset::new(partition.output_name.clone(), data)))
}

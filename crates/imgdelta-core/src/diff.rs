//! Diff providers.
//!
//! The binary diff algorithm itself lives outside this crate. A
//! [`DiffProvider`] turns a source and target image into an opaque patch, or
//! fails; the decision engine treats any failure as "no usable patch".

use std::process::Command;

use bytes::Bytes;
use tracing::debug;

use crate::config::{DiffConfig, PATCH_PLACEHOLDER, SOURCE_PLACEHOLDER, TARGET_PLACEHOLDER};
use crate::error::DiffError;
use crate::image::ImageAsset;

/// Produces a patch that transforms `source` into `target`.
pub trait DiffProvider {
    /// Name of the algorithm, for logs and reports.
    fn algorithm(&self) -> &str;

    /// Compute the patch.
    fn diff(&self, source: &ImageAsset, target: &ImageAsset) -> Result<Bytes, DiffError>;
}

impl<T: DiffProvider + ?Sized> DiffProvider for &T {
    fn algorithm(&self) -> &str {
        (**self).algorithm()
    }

    fn diff(&self, source: &ImageAsset, target: &ImageAsset) -> Result<Bytes, DiffError> {
        (**self).diff(source, target)
    }
}

impl<T: DiffProvider + ?Sized> DiffProvider for Box<T> {
    fn algorithm(&self) -> &str {
        (**self).algorithm()
    }

    fn diff(&self, source: &ImageAsset, target: &ImageAsset) -> Result<Bytes, DiffError> {
        (**self).diff(source, target)
    }
}

/// Runs an external diff program (bsdiff, imgdiff, ...) on scratch files.
///
/// Arguments may reference `{source}`, `{target}` and `{patch}`; each is
/// replaced by a path inside a private temporary directory. The program must
/// leave a non-empty patch file at `{patch}` and exit successfully.
#[derive(Debug, Clone)]
pub struct ExternalDiff {
    algorithm: String,
    program: String,
    args: Vec<String>,
}

impl ExternalDiff {
    pub fn new(algorithm: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &DiffConfig) -> Self {
        Self::new(
            config.algorithm.clone(),
            config.program().to_string(),
            config.args.clone(),
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl DiffProvider for ExternalDiff {
    fn algorithm(&self) -> &str {
        &self.algorithm
    }

    fn diff(&self, source: &ImageAsset, target: &ImageAsset) -> Result<Bytes, DiffError> {
        let scratch = tempfile::Builder::new().prefix("imgdelta-").tempdir()?;
        let source_path = scratch.path().join("source");
        let target_path = scratch.path().join("target");
        let patch_path = scratch.path().join("patch");

        std::fs::write(&source_path, source.bytes())?;
        std::fs::write(&target_path, target.bytes())?;

        let source_arg = source_path.to_string_lossy();
        let target_arg = target_path.to_string_lossy();
        let patch_arg = patch_path.to_string_lossy();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace(SOURCE_PLACEHOLDER, &source_arg)
                    .replace(TARGET_PLACEHOLDER, &target_arg)
                    .replace(PATCH_PLACEHOLDER, &patch_arg)
            })
            .collect();

        debug!(
            program = %self.program,
            source = source.name(),
            target = target.name(),
            "Running diff program"
        );

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| DiffError::SpawnFailed {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(DiffError::ProgramFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let patch = match std::fs::read(&patch_path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DiffError::EmptyPatch(self.program.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        if patch.is_empty() {
            return Err(DiffError::EmptyPatch(self.program.clone()));
        }

        debug!(program = %self.program, size = patch.len(), "Diff program finished");
        Ok(Bytes::from(patch))
    }
}

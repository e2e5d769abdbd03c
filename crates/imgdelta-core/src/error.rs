//! Error types for the packaging engine.

use thiserror::Error;

/// Errors that abort a packaging run.
///
/// Missing images, diff failures and oversized patches are not errors: they
/// downgrade to a full transfer and never surface here.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Reading from or writing to an archive failed
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Configuration is missing or invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A mount point has no entry in the device table
    #[error("no device mapping for mount point {0}")]
    UnknownMountPoint(String),

    /// A patch descriptor was requested outside the patch branch
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

/// Genuine I/O failures of an archive collaborator.
///
/// An absent member is reported as `Ok(None)` by readers, never as an error.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Member name escapes the archive root or is otherwise unusable
    #[error("invalid member name: {0}")]
    InvalidMember(String),

    /// IO error
    #[error("IO error on {member}: {source}")]
    Io {
        member: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of a diff provider.
///
/// Always recoverable: the decision engine falls back to a full transfer.
#[derive(Debug, Error)]
pub enum DiffError {
    /// Diff program could not be started
    #[error("failed to run {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    /// Diff program exited unsuccessfully
    #[error("{program} exited with {status}: {stderr}")]
    ProgramFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// Diff program succeeded but left no patch behind
    #[error("{0} produced an empty patch")]
    EmptyPatch(String),

    /// Algorithm cannot handle these inputs
    #[error("unsupported input: {0}")]
    Unsupported(String),

    /// Scratch file handling failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

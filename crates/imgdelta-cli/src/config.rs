//! Configuration management for the imgdelta CLI
//!
//! The CLI configuration wraps the packaging record handed to the engine
//! plus output and logging preferences. Configuration is stored in TOML.
//!
//! # Configuration File Locations
//!
//! - Unix: `~/.config/imgdelta/imgdelta.toml`
//! - Windows: `%APPDATA%\imgdelta\imgdelta.toml`
//!
//! CLI arguments override values from the file.

use std::path::{Path, PathBuf};

use imgdelta_core::PackagingConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::output::OutputFormat;

/// Configuration errors
#[derive(Debug, Error)]
pub enum CliConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// CLI configuration
///
/// # Example TOML
///
/// ```toml
/// [packaging]
/// patch_threshold = 0.95
///
/// [packaging.diff]
/// algorithm = "bsdiff"
///
/// [output]
/// format = "table"  # "table" | "json" | "quiet"
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Packaging configuration passed to the engine
    #[serde(default)]
    pub packaging: PackagingConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "table", "json" or "quiet"
    #[serde(default = "default_output_format")]
    pub format: String,

    /// Name of the instruction file written next to the package members
    #[serde(default = "default_instructions_file")]
    pub instructions_file: String,
}

fn default_output_format() -> String {
    "table".to_string()
}

fn default_instructions_file() -> String {
    "instructions.json".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_output_format(),
            instructions_file: default_instructions_file(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl CliConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, CliConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: CliConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self, CliConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from custom path or default
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, CliConfigError> {
        if let Some(path) = custom_path {
            Self::load(path)
        } else {
            Self::load_default()
        }
    }

    /// Get default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "imgdelta")
            .map(|dirs| dirs.config_dir().join("imgdelta.toml"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), CliConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), CliConfigError> {
        self.output
            .format
            .parse::<OutputFormat>()
            .map_err(CliConfigError::ValidationError)?;

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(CliConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        if self.output.instructions_file.is_empty()
            || self.output.instructions_file.contains(['/', '\\'])
        {
            return Err(CliConfigError::ValidationError(format!(
                "Invalid instructions file name '{}'",
                self.output.instructions_file
            )));
        }

        self.packaging
            .validate()
            .map_err(|e| CliConfigError::ValidationError(e.to_string()))?;

        if self
            .packaging
            .output_members()
            .contains(&self.output.instructions_file)
        {
            return Err(CliConfigError::ValidationError(format!(
                "instructions file '{}' collides with a package member",
                self.output.instructions_file
            )));
        }

        Ok(())
    }
}

/// CLI overrides for configuration values
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Output format override
    pub output_format: Option<String>,
    /// Debug logging override
    pub debug: Option<bool>,
    /// Verbose logging override
    pub verbose: Option<bool>,
    /// Patch threshold override
    pub patch_threshold: Option<f64>,
    /// Diff program override
    pub diff_program: Option<String>,
}

impl CliConfig {
    /// Apply CLI overrides to configuration
    ///
    /// CLI arguments take precedence over config file values.
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(ref format) = overrides.output_format {
            self.output.format = format.clone();
        }
        if overrides.verbose == Some(true) {
            self.logging.level = "info".to_string();
        }
        if overrides.debug == Some(true) {
            self.logging.level = "debug".to_string();
        }
        if let Some(threshold) = overrides.patch_threshold {
            self.packaging.patch_threshold = threshold;
        }
        if let Some(ref program) = overrides.diff_program {
            self.packaging.diff.program = Some(program.clone());
        }
        self
    }
}

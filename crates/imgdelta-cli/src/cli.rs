//! CLI command definitions and argument parsing

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use imgdelta_core::{DirArchive, ExternalDiff, ImageAsset, Instruction, Packager};
use tracing::info;

use crate::config::CliConfig;
use crate::output::{ImageInfo, OutputFormat, OutputFormatter};
use crate::ExitCode;

/// imgdelta - firmware image update packager
#[derive(Parser, Debug)]
#[command(name = "imgdelta")]
#[command(version, about = "Build full and incremental firmware image update packages")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table, json or quiet
    #[arg(long, global = true)]
    pub output_format: Option<OutputFormat>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true, env = "IMGDELTA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Largest patch, as a fraction of the target image size
    #[arg(long, global = true)]
    pub threshold: Option<f64>,

    /// Diff program to run instead of the configured one
    #[arg(long, global = true)]
    pub diff_program: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Package every image of the target tree in full
    Full {
        /// Unpacked target-files directory
        #[arg(long)]
        target: PathBuf,

        /// Output package directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Package the changes from a source tree to a target tree
    Incremental {
        /// Unpacked source-files directory (what the device runs now)
        #[arg(long)]
        source: PathBuf,

        /// Unpacked target-files directory
        #[arg(long)]
        target: PathBuf,

        /// Output package directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show the pre-install checks for an incremental package
    Verify {
        /// Unpacked source-files directory
        #[arg(long)]
        source: PathBuf,

        /// Unpacked target-files directory
        #[arg(long)]
        target: PathBuf,
    },

    /// Show size and SHA-1 of image files
    Inspect {
        /// Image files
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

impl Cli {
    /// Execute the CLI command with a resolved configuration
    pub fn execute_with_config(self, config: CliConfig) -> anyhow::Result<ExitCode> {
        let format = config
            .output
            .format
            .parse::<OutputFormat>()
            .map_err(anyhow::Error::msg)?;
        let formatter = OutputFormatter::new(format);

        match self.command {
            Commands::Full { target, output } => {
                run_full(&config, &formatter, &target, &output)
            }
            Commands::Incremental {
                source,
                target,
                output,
            } => run_incremental(&config, &formatter, &source, &target, &output),
            Commands::Verify { source, target } => {
                run_verify(&config, &formatter, &source, &target)
            }
            Commands::Inspect { images } => run_inspect(&formatter, &images),
        }
    }
}

fn packager(config: &CliConfig) -> anyhow::Result<Packager<ExternalDiff>> {
    let diff = ExternalDiff::from_config(&config.packaging.diff);
    Ok(Packager::new(config.packaging.clone(), diff)?)
}

fn existing_dir(path: &Path, what: &str) -> anyhow::Result<DirArchive> {
    if !path.is_dir() {
        anyhow::bail!("{what} directory {} does not exist", path.display());
    }
    Ok(DirArchive::new(path))
}

/// Open the package directory; it must be absent or empty so members from an
/// earlier run cannot end up next to the new package.
fn fresh_output(path: &Path) -> anyhow::Result<DirArchive> {
    if path.exists() {
        let mut entries = std::fs::read_dir(path)
            .with_context(|| format!("output {} is not a readable directory", path.display()))?;
        if entries.next().is_some() {
            anyhow::bail!("output directory {} is not empty", path.display());
        }
    }
    Ok(DirArchive::new(path))
}

fn run_full(
    config: &CliConfig,
    formatter: &OutputFormatter,
    target: &Path,
    output: &Path,
) -> anyhow::Result<ExitCode> {
    let packager = packager(config)?;
    let target = existing_dir(target, "target")?;
    let mut writer = fresh_output(output)?;
    let mut instructions: Vec<Instruction> = Vec::new();

    let report = packager.package_full(&target, &mut writer, &mut instructions)?;
    write_instructions(config, writer.root(), &instructions)?;
    info!(output = %writer.root().display(), bytes = report.bytes_written(), "Full package built");

    print_non_empty(formatter.format_package(&report, &instructions));
    Ok(ExitCode::Success)
}

fn run_incremental(
    config: &CliConfig,
    formatter: &OutputFormatter,
    source: &Path,
    target: &Path,
    output: &Path,
) -> anyhow::Result<ExitCode> {
    let packager = packager(config)?;
    let source = existing_dir(source, "source")?;
    let target = existing_dir(target, "target")?;
    let mut writer = fresh_output(output)?;
    let mut instructions: Vec<Instruction> = Vec::new();

    packager.verify_incremental(&source, &target, &mut instructions)?;
    let report =
        packager.package_incremental(&source, &target, &mut writer, &mut instructions)?;
    write_instructions(config, writer.root(), &instructions)?;
    info!(output = %writer.root().display(), bytes = report.bytes_written(), "Incremental package built");

    print_non_empty(formatter.format_package(&report, &instructions));
    Ok(ExitCode::Success)
}

fn run_verify(
    config: &CliConfig,
    formatter: &OutputFormatter,
    source: &Path,
    target: &Path,
) -> anyhow::Result<ExitCode> {
    let packager = packager(config)?;
    let source = existing_dir(source, "source")?;
    let target = existing_dir(target, "target")?;
    let mut instructions: Vec<Instruction> = Vec::new();

    packager.verify_incremental(&source, &target, &mut instructions)?;
    print_non_empty(formatter.format_instructions(&instructions));
    Ok(ExitCode::Success)
}

fn run_inspect(formatter: &OutputFormatter, paths: &[PathBuf]) -> anyhow::Result<ExitCode> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let data =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let image = ImageAsset::new(path.display().to_string(), data);
        images.push(ImageInfo::from(&image));
    }
    print_non_empty(formatter.format_images(&images));
    Ok(ExitCode::Success)
}

/// Store the statement payloads next to the package members.
fn write_instructions(
    config: &CliConfig,
    output: &Path,
    instructions: &[Instruction],
) -> anyhow::Result<()> {
    let path = output.join(&config.output.instructions_file);
    let json = serde_json::to_string_pretty(instructions)?;
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn print_non_empty(text: String) {
    if !text.is_empty() {
        println!("{text}");
    }
}

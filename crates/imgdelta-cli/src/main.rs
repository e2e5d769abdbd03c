//! imgdelta CLI entry point

use clap::Parser;
use imgdelta_cli::{Cli, CliConfig, CliOverrides, ExitCode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // A config file that was asked for but cannot be used is fatal; a broken
    // default file only warns.
    let config = match CliConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) if cli.config.is_some() => {
            eprintln!("Error: {e}");
            return ExitCode::InvalidInput.to_exit_code();
        }
        Err(e) => {
            eprintln!("Warning: Config error: {e}");
            eprintln!("Using default configuration.");
            CliConfig::default()
        }
    };

    let overrides = CliOverrides {
        output_format: cli.output_format.map(|f| f.to_string()),
        debug: if cli.debug { Some(true) } else { None },
        verbose: if cli.verbose { Some(true) } else { None },
        patch_threshold: cli.threshold,
        diff_program: cli.diff_program.clone(),
    };
    let config = config.with_overrides(&overrides);

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        return ExitCode::InvalidInput.to_exit_code();
    }

    match cli.execute_with_config(config) {
        Ok(code) => code.to_exit_code(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::for_error(&e).to_exit_code()
        }
    }
}

// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `stepwise`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "stepwise",
    version,
    about = "Run build steps in dependency order, skipping steps whose files are unchanged.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the build file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Stepwise.toml")]
    pub config: String,

    /// Step to build, with its dependencies. Repeatable.
    ///
    /// Without it, every step that nothing depends on is built, in name order.
    #[arg(long = "step", value_name = "NAME")]
    pub steps: Vec<String>,

    /// Run independent steps concurrently.
    #[arg(long)]
    pub parallel: bool,

    /// Override `[config].cache_dir`.
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STEPWISE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the steps, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

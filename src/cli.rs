// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::Overrides;
use crate::types::BackendKind;

/// Command-line arguments for `warehouse`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "warehouse",
    version,
    about = "Drive simulation datasets through extraction, postprocessing, validation and publication.",
    long_about = None
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Which workflow to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the whole pipeline from the root workflow.
    Auto,
    /// Extract datasets from the archive into staging.
    Extract,
    /// Remove staged copies of finished datasets.
    Cleanup,
    /// Generate climatologies, time series and derived products.
    Postprocess,
    /// Publish validated datasets.
    Publish,
    /// Validate staged datasets.
    Validate,
}

impl Command {
    /// Workflow namespace the subcommand selects.
    pub fn namespace(&self) -> &'static str {
        match self {
            Command::Auto => "WAREHOUSE",
            Command::Extract => "EXTRACTION",
            Command::Cleanup => "CLEANUP",
            Command::Postprocess => "POSTPROCESS",
            Command::Publish => "PUBLICATION",
            Command::Validate => "VALIDATION",
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Path to the settings file (TOML).
    ///
    /// Default: `warehouse.toml` in the current working directory; it may
    /// be absent if every required path is given on the command line.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only datasets whose id matches one of these globs.
    #[arg(long = "dataset-id", global = true, value_name = "GLOB")]
    pub dataset_ids: Vec<String>,

    #[arg(long, global = true, value_name = "DIR")]
    pub staging: Option<PathBuf>,

    #[arg(long, global = true, value_name = "DIR")]
    pub publication: Option<PathBuf>,

    #[arg(long, global = true, value_name = "DIR")]
    pub archive: Option<PathBuf>,

    /// Dataset catalog (TOML).
    #[arg(long, global = true, value_name = "PATH")]
    pub catalog: Option<PathBuf>,

    /// Transition graph (TOML).
    #[arg(long, global = true, value_name = "PATH")]
    pub graph: Option<PathBuf>,

    /// Text file listing already-published dataset ids.
    #[arg(long, global = true, value_name = "PATH")]
    pub index: Option<PathBuf>,

    /// Directory holding the per-dataset status logs.
    #[arg(long, global = true, value_name = "DIR")]
    pub status_root: Option<PathBuf>,

    #[arg(long, global = true, value_enum, value_name = "BACKEND")]
    pub scheduler: Option<BackendKind>,

    /// Worker threads for the initial status lookup.
    #[arg(long, global = true, value_name = "N")]
    pub workers: Option<usize>,

    /// Look up initial status on the calling thread.
    #[arg(long, global = true)]
    pub serial: bool,

    /// Abort on the first submission failure.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WAREHOUSE_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Discover datasets and print their state, but submit nothing.
    #[arg(long, global = true)]
    pub dry_run: bool,
}

impl CommonArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            staging: self.staging.clone(),
            publication: self.publication.clone(),
            archive: self.archive.clone(),
            status_root: self.status_root.clone(),
            catalog: self.catalog.clone(),
            graph: self.graph.clone(),
            index: self.index.clone(),
            backend: self.scheduler,
            workers: self.workers,
            serial: self.serial,
            strict: self.strict,
            dataset_ids: self.dataset_ids.clone(),
        }
    }
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

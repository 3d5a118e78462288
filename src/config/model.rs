// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::batch::{Directives, SlurmOptions};
use crate::dataset::StorageRoots;
use crate::jobs::JobKind;
use crate::types::BackendKind;

/// `warehouse.toml` as read from disk.
///
/// ```toml
/// [paths]
/// staging = "/lcrc/group/e3sm/staging"
/// publication = "/lcrc/group/e3sm/publication"
/// archive = "/lcrc/group/e3sm/archive"
/// status_root = "/lcrc/group/e3sm/status"
/// catalog = "catalog.toml"
/// graph = "graph.toml"
///
/// [scheduler]
/// backend = "slurm"
/// partition = "debug"
///
/// [run]
/// workers = 8
/// max_attempts = 3
///
/// [jobs.ClimoGen]
/// command = "ncclimo -s {start} -e {end} -i {input:*-native-mon} -o {staging}"
/// ```
///
/// Every field is optional here; CLI overrides are applied on top and the
/// result is checked by `TryFrom<RawSettings> for Settings`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSettings {
    #[serde(default)]
    pub paths: RawPaths,

    #[serde(default)]
    pub scheduler: RawScheduler,

    #[serde(default)]
    pub run: RawRun,

    /// Keyed by job kind name.
    #[serde(default)]
    pub jobs: BTreeMap<String, RawJob>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPaths {
    pub staging: Option<PathBuf>,
    pub publication: Option<PathBuf>,
    pub archive: Option<PathBuf>,
    pub status_root: Option<PathBuf>,
    /// Where wrapper scripts are written. Defaults to `<status_root>/scripts`.
    pub scripts: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub graph: Option<PathBuf>,
    /// Optional list of already-published dataset ids.
    pub index: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawScheduler {
    #[serde(default)]
    pub backend: BackendKind,
    pub partition: Option<String>,
    pub account: Option<String>,
    pub time_limit: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub sbatch: Option<String>,
    pub squeue: Option<String>,
    pub scancel: Option<String>,
    pub submit_attempts: Option<u32>,
    /// Per scheduler-CLI call.
    pub command_timeout_secs: Option<u64>,
    pub backoff_secs: Option<u64>,
    /// Upper bound on one whole `submit`, retries included.
    pub submit_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRun {
    pub workers: Option<usize>,
    #[serde(default)]
    pub serial: bool,
    #[serde(default)]
    pub strict: bool,
    pub max_attempts: Option<u32>,
    pub sweep_interval_secs: Option<u64>,
    /// Glob patterns over dataset ids.
    #[serde(default)]
    pub dataset_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJob {
    pub command: String,
}

pub(crate) const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub(crate) const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub(crate) const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 120;

/// Scheduler adapter choice plus its knobs.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub backend: BackendKind,
    pub directives: Directives,
    pub slurm: SlurmOptions,
    pub submit_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub workers: usize,
    pub serial: bool,
    /// Submission failures abort the run.
    pub strict: bool,
    /// Consecutive resolution / submission failures before a job step is
    /// written as `Fail`.
    pub max_attempts: u32,
    pub sweep_interval: Duration,
    pub dataset_filters: Vec<String>,
}

/// Validated settings, built once and passed by reference.
#[derive(Debug, Clone)]
pub struct Settings {
    pub roots: StorageRoots,
    pub status_root: PathBuf,
    pub scripts_dir: PathBuf,
    pub catalog: PathBuf,
    pub graph: PathBuf,
    pub index: Option<PathBuf>,
    pub scheduler: SchedulerSettings,
    pub run: RunSettings,
    pub jobs: BTreeMap<JobKind, String>,
}

impl Settings {
    pub fn command_template(&self, kind: JobKind) -> Option<&str> {
        self.jobs.get(&kind).map(String::as_str)
    }
}

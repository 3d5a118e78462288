// src/config/validate.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::batch::{Directives, SlurmOptions};
use crate::config::model::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_SUBMIT_TIMEOUT_SECS, DEFAULT_SWEEP_INTERVAL_SECS, RawSettings,
    RunSettings, SchedulerSettings, Settings,
};
use crate::dataset::StorageRoots;
use crate::errors::{Result, WarehouseError};
use crate::jobs::JobKind;

impl TryFrom<RawSettings> for Settings {
    type Error = WarehouseError;

    fn try_from(raw: RawSettings) -> std::result::Result<Self, Self::Error> {
        let paths = raw.paths;
        let roots = StorageRoots {
            staging: required(paths.staging, "paths.staging")?,
            publication: required(paths.publication, "paths.publication")?,
            archive: required(paths.archive, "paths.archive")?,
        };
        let status_root = required(paths.status_root, "paths.status_root")?;
        let scripts_dir = paths.scripts.unwrap_or_else(|| status_root.join("scripts"));
        let catalog = required(paths.catalog, "paths.catalog")?;
        let graph = required(paths.graph, "paths.graph")?;

        let scheduler = validate_scheduler(raw.scheduler)?;
        let run = validate_run(raw.run)?;
        let jobs = validate_jobs(raw.jobs)?;

        Ok(Settings {
            roots,
            status_root,
            scripts_dir,
            catalog,
            graph,
            index: paths.index,
            scheduler,
            run,
            jobs,
        })
    }
}

fn required(value: Option<PathBuf>, what: &str) -> Result<PathBuf> {
    value.ok_or_else(|| {
        WarehouseError::Configuration(format!(
            "`{what}` must be set in the settings file or on the command line"
        ))
    })
}

fn positive(value: u64, what: &str) -> Result<u64> {
    if value == 0 {
        return Err(WarehouseError::Configuration(format!(
            "`{what}` must be >= 1 (got 0)"
        )));
    }
    Ok(value)
}

fn validate_scheduler(raw: crate::config::model::RawScheduler) -> Result<SchedulerSettings> {
    let defaults = SlurmOptions::default();
    let slurm = SlurmOptions {
        sbatch: raw.sbatch.unwrap_or(defaults.sbatch),
        squeue: raw.squeue.unwrap_or(defaults.squeue),
        scancel: raw.scancel.unwrap_or(defaults.scancel),
        attempts: positive(
            u64::from(raw.submit_attempts.unwrap_or(defaults.attempts)),
            "scheduler.submit_attempts",
        )? as u32,
        timeout: raw
            .command_timeout_secs
            .map(|s| positive(s, "scheduler.command_timeout_secs").map(Duration::from_secs))
            .transpose()?
            .unwrap_or(defaults.timeout),
        backoff: raw
            .backoff_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.backoff),
    };
    let submit_timeout = Duration::from_secs(positive(
        raw.submit_timeout_secs.unwrap_or(DEFAULT_SUBMIT_TIMEOUT_SECS),
        "scheduler.submit_timeout_secs",
    )?);

    Ok(SchedulerSettings {
        backend: raw.backend,
        directives: Directives {
            partition: raw.partition,
            account: raw.account,
            time_limit: raw.time_limit,
            output_dir: raw.output_dir,
        },
        slurm,
        submit_timeout,
    })
}

fn validate_run(raw: crate::config::model::RawRun) -> Result<RunSettings> {
    let workers = match raw.workers {
        Some(n) => positive(n as u64, "run.workers")? as usize,
        None => std::thread::available_parallelism().map_or(1, |n| n.get()),
    };
    let max_attempts = positive(
        u64::from(raw.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)),
        "run.max_attempts",
    )? as u32;
    let sweep_interval = Duration::from_secs(positive(
        raw.sweep_interval_secs.unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        "run.sweep_interval_secs",
    )?);

    // Compile once here so a bad pattern is a configuration error up front.
    crate::watch::patterns::build_globset(&raw.dataset_ids)
        .map_err(|e| WarehouseError::Configuration(format!("run.dataset_ids: {e:#}")))?;

    Ok(RunSettings {
        workers,
        serial: raw.serial,
        strict: raw.strict,
        max_attempts,
        sweep_interval,
        dataset_filters: raw.dataset_ids,
    })
}

fn validate_jobs(
    raw: BTreeMap<String, crate::config::model::RawJob>,
) -> Result<BTreeMap<JobKind, String>> {
    let mut jobs = BTreeMap::new();
    for (name, job) in raw {
        let kind = JobKind::from_name(&name).ok_or_else(|| {
            WarehouseError::Configuration(format!(
                "[jobs.{name}] does not name a known job kind (expected one of: {})",
                JobKind::all().map(|k| k.name()).collect::<Vec<_>>().join(", ")
            ))
        })?;
        if job.command.trim().is_empty() {
            return Err(WarehouseError::Configuration(format!(
                "[jobs.{name}].command must not be empty"
            )));
        }
        jobs.insert(kind, job.command);
    }
    Ok(jobs)
}

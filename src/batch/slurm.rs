// src/batch/slurm.rs

//! SLURM adapter over `sbatch`, `squeue` and `scancel`.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::batch::{BatchScheduler, BoxFuture, JobInfo, RenderedScript};
use crate::errors::Result;
use crate::jobs::JobId;

#[derive(Debug, Clone)]
pub struct SlurmOptions {
    pub sbatch: String,
    pub squeue: String,
    pub scancel: String,
    /// Submission attempts before giving up with `Ok(None)`.
    pub attempts: u32,
    /// Per-invocation timeout.
    pub timeout: Duration,
    /// Delay before the second attempt; doubled after each failure.
    pub backoff: Duration,
}

impl Default for SlurmOptions {
    fn default() -> Self {
        Self {
            sbatch: "sbatch".to_string(),
            squeue: "squeue".to_string(),
            scancel: "scancel".to_string(),
            attempts: 3,
            timeout: Duration::from_secs(30),
            backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    opts: SlurmOptions,
}

impl SlurmScheduler {
    pub fn new(opts: SlurmOptions) -> Self {
        Self { opts }
    }

    async fn invoke(&self, program: &str, args: &[&str]) -> anyhow::Result<Output> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.opts.timeout, cmd.output())
            .await
            .map_err(|_| anyhow!("{program} timed out after {:?}", self.opts.timeout))?
            .with_context(|| format!("running {program}"))?;
        Ok(output)
    }

    async fn submit_once(&self, script: &RenderedScript) -> anyhow::Result<JobId> {
        let path = script.path.display().to_string();
        let out = self.invoke(&self.opts.sbatch, &["--parsable", &path]).await?;
        if !out.status.success() {
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.opts.sbatch,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        parse_parsable(&String::from_utf8_lossy(&out.stdout))
            .ok_or_else(|| anyhow!("{} printed no job id", self.opts.sbatch))
    }
}

/// `sbatch --parsable` prints `<id>` or `<id>;<cluster>`.
pub fn parse_parsable(stdout: &str) -> Option<JobId> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let id = line.split(';').next()?.trim();
    (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit() || c == '_'))
        .then(|| JobId(id.to_string()))
}

/// `squeue --noheader --format=%i|%j|%T` lines.
pub fn parse_queue(stdout: &str) -> Vec<JobInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(3, '|');
            let id = parts.next().filter(|s| !s.is_empty())?;
            Some(JobInfo {
                id: JobId(id.to_string()),
                name: parts.next().unwrap_or_default().to_string(),
                state: parts.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

impl BatchScheduler for SlurmScheduler {
    fn submit(&self, script: RenderedScript) -> BoxFuture<'_, Result<Option<JobId>>> {
        Box::pin(async move {
            let mut delay = self.opts.backoff;
            for attempt in 1..=self.opts.attempts.max(1) {
                match self.submit_once(&script).await {
                    Ok(id) => {
                        info!(job_id = %id, script = %script.name, attempt, "submitted");
                        return Ok(Some(id));
                    }
                    Err(err) => {
                        warn!(script = %script.name, attempt, error = %err, "submission attempt failed");
                    }
                }
                if attempt < self.opts.attempts {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
            Ok(None)
        })
    }

    fn queue(&self) -> BoxFuture<'_, Result<Vec<JobInfo>>> {
        Box::pin(async move {
            let out = self
                .invoke(&self.opts.squeue, &["--noheader", "--format=%i|%j|%T"])
                .await?;
            if !out.status.success() {
                return Err(anyhow!("{} exited with {}", self.opts.squeue, out.status).into());
            }
            let jobs = parse_queue(&String::from_utf8_lossy(&out.stdout));
            debug!(count = jobs.len(), "queried queue");
            Ok(jobs)
        })
    }

    fn cancel(&self, id: JobId) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let out = self.invoke(&self.opts.scancel, &[id.0.as_str()]).await?;
            Ok(out.status.success())
        })
    }
}

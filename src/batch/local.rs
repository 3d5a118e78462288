// src/batch/local.rs

//! Runs wrapper scripts as background `sh` processes on this host.
//!
//! Submission returns as soon as the process is spawned. The wrapper itself
//! reports the outcome through the status logs, exactly as it would under
//! SLURM.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::batch::{BatchScheduler, BoxFuture, JobInfo, RenderedScript};
use crate::errors::Result;
use crate::jobs::JobId;

/// A spawned wrapper process.
struct ActiveJob {
    name: String,
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

#[derive(Clone, Default)]
pub struct LocalScheduler {
    next_id: Arc<AtomicU64>,
    active: Arc<Mutex<HashMap<JobId, ActiveJob>>>,
}

impl std::fmt::Debug for LocalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalScheduler").finish_non_exhaustive()
    }
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, HashMap<JobId, ActiveJob>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BatchScheduler for LocalScheduler {
    fn submit(&self, script: RenderedScript) -> BoxFuture<'_, Result<Option<JobId>>> {
        Box::pin(async move {
            let mut child = Command::new("sh")
                .arg(&script.path)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .with_context(|| format!("spawning job script {:?}", script.path))?;

            let id = JobId(format!("local-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1));
            info!(job_id = %id, script = %script.name, "started local job");

            if let Some(stderr) = child.stderr.take() {
                let job = id.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(job_id = %job, "stderr: {}", line);
                    }
                });
            }

            let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
            let job = id.clone();
            let handle = tokio::spawn(async move {
                tokio::select! {
                    status = child.wait() => match status {
                        Ok(status) => info!(job_id = %job, exit_code = status.code().unwrap_or(-1), "local job exited"),
                        Err(e) => warn!(job_id = %job, error = %e, "waiting for local job failed"),
                    },
                    cancel = &mut cancel_rx => {
                        if cancel.is_ok() {
                            info!(job_id = %job, "cancelling local job");
                            if let Err(e) = child.kill().await {
                                warn!(job_id = %job, error = %e, "failed to kill local job");
                            }
                        }
                        // A dropped sender means the scheduler went away;
                        // kill_on_drop takes care of the child.
                    }
                }
            });

            self.active().insert(
                id.clone(),
                ActiveJob {
                    name: script.name,
                    cancel: Some(cancel_tx),
                    handle,
                },
            );
            Ok(Some(id))
        })
    }

    fn queue(&self) -> BoxFuture<'_, Result<Vec<JobInfo>>> {
        Box::pin(async move {
            let mut active = self.active();
            active.retain(|_, job| !job.handle.is_finished());
            let mut jobs: Vec<JobInfo> = active
                .iter()
                .map(|(id, job)| JobInfo {
                    id: id.clone(),
                    name: job.name.clone(),
                    state: "RUNNING".to_string(),
                })
                .collect();
            jobs.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(jobs)
        })
    }

    fn cancel(&self, id: JobId) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let cancel = self
                .active()
                .get_mut(&id)
                .filter(|job| !job.handle.is_finished())
                .and_then(|job| job.cancel.take());
            match cancel {
                Some(tx) => Ok(tx.send(()).is_ok()),
                None => {
                    debug!(job_id = %id, "no running local job to cancel");
                    Ok(false)
                }
            }
        })
    }
}

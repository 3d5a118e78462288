// src/batch/mod.rs

//! Narrow submit / queue / cancel boundary over the batch scheduler.
//!
//! - [`script`] renders the job-wrapper shell script.
//! - [`slurm`] talks to `sbatch` / `squeue` / `scancel`.
//! - [`local`] runs wrapper scripts as background processes on this host.
//!
//! The runtime only ever sees [`BatchScheduler`], so tests can substitute a
//! fake that records submissions without spawning anything.

pub mod local;
pub mod script;
pub mod slurm;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use anyhow::Context;

use crate::errors::Result;
use crate::jobs::JobId;

pub use local::LocalScheduler;
pub use script::{Directives, WrapperSpec, render_wrapper};
pub use slurm::{SlurmOptions, SlurmScheduler};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A wrapper script ready to be written and submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedScript {
    pub name: String,
    pub path: PathBuf,
    pub body: String,
}

impl RenderedScript {
    pub async fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating script dir {:?}", parent))?;
        }
        tokio::fs::write(&self.path, &self.body)
            .await
            .with_context(|| format!("writing job script {:?}", self.path))?;
        Ok(())
    }
}

/// One line of the scheduler's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub state: String,
}

pub trait BatchScheduler: Send + Sync {
    /// Queue `script`. Returns as soon as the job is queued.
    ///
    /// `Ok(None)` means the scheduler never handed back an id after its
    /// retries; the caller decides whether that is fatal.
    fn submit(&self, script: RenderedScript) -> BoxFuture<'_, Result<Option<JobId>>>;

    fn queue(&self) -> BoxFuture<'_, Result<Vec<JobInfo>>>;

    /// `true` if the scheduler accepted the cancellation.
    fn cancel(&self, id: JobId) -> BoxFuture<'_, Result<bool>>;
}

// src/jobs/mod.rs

//! Units of asynchronous batch work and their input requirements.
//!
//! - [`kind`] is the static job-kind registry.
//! - [`requirements`] matches candidate datasets against requirement slots.
//! - [`pool`] holds pending and in-flight jobs and merges duplicates.
//! - [`render`] fills `{placeholder}` command templates.

pub mod kind;
pub mod pool;
pub mod render;
pub mod requirements;

use std::fmt;

use crate::dataset::DatasetId;

pub use kind::JobKind;
pub use pool::{JobKey, JobPool};
pub use render::{RenderContext, render_command};
pub use requirements::{BuiltinCrossReference, CrossReference, matches_requirement, meets_requirements};

/// Scheduler-assigned job id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status-log parameter carrying the scheduler job id on Engaged events.
pub const JOB_ID_PARAM: &str = "job_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// Waiting for inputs, a free lock, or a retry.
    Pending,
    /// Handed to the scheduler adapter; result not yet recorded.
    Submitting,
    Submitted,
}

/// One named input slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementSlot {
    /// `realm-grid-freq` pattern, `*` per segment.
    pub key: String,
    pub dataset: Option<DatasetId>,
}

#[derive(Debug, Clone)]
pub struct WorkflowJob {
    pub kind: JobKind,
    /// Namespace the Engaged leaf came from; major of the job's events.
    pub namespace: String,
    pub target: DatasetId,
    pub requirements: Vec<RequirementSlot>,
    /// Datasets whose logs receive this job's events. Always starts with
    /// the target; merged jobs add their targets.
    pub participants: Vec<DatasetId>,
    pub job_id: Option<JobId>,
    pub submission: SubmissionStatus,
}

impl WorkflowJob {
    pub fn new(kind: JobKind, namespace: impl Into<String>, target: DatasetId) -> Self {
        let requirements = kind
            .requirements(&target)
            .into_iter()
            .map(|key| RequirementSlot { key, dataset: None })
            .collect();
        Self {
            kind,
            namespace: namespace.into(),
            participants: vec![target.clone()],
            target,
            requirements,
            job_id: None,
            submission: SubmissionStatus::Pending,
        }
    }

    /// Fill slot `key` if it is still empty.
    pub fn fill(&mut self, key: &str, dataset: DatasetId) -> bool {
        match self
            .requirements
            .iter_mut()
            .find(|s| s.key == key && s.dataset.is_none())
        {
            Some(slot) => {
                slot.dataset = Some(dataset);
                true
            }
            None => false,
        }
    }

    /// Whether `id` already sits in one of the slots.
    pub fn holds(&self, id: &DatasetId) -> bool {
        self.requirements
            .iter()
            .any(|s| s.dataset.as_ref() == Some(id))
    }

    /// Datasets this job can offer to another job's slots: its target plus
    /// whatever it already resolved.
    pub fn offered(&self) -> impl Iterator<Item = &DatasetId> {
        std::iter::once(&self.target).chain(self.requirements.iter().filter_map(|s| s.dataset.as_ref()))
    }

    pub fn input(&self, key: &str) -> Option<&DatasetId> {
        self.requirements
            .iter()
            .find(|s| s.key == key)
            .and_then(|s| s.dataset.as_ref())
    }

    pub fn is_ready(&self) -> bool {
        meets_requirements(self)
    }

    pub fn add_participant(&mut self, id: DatasetId) {
        if !self.participants.contains(&id) {
            self.participants.push(id);
        }
    }
}

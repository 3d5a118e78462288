// src/jobs/pool.rs

//! Pending and in-flight jobs, with duplicate merging.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::dataset::DatasetId;
use crate::dataset::id::{ensembles_match, normalize_model_version};
use crate::jobs::requirements::{CrossReference, matches_requirement};
use crate::jobs::{JobId, JobKind, SubmissionStatus, WorkflowJob};

/// Stable handle on a pooled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey(pub u64);

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct JobPool {
    next_key: u64,
    jobs: BTreeMap<JobKey, WorkflowJob>,
}

impl JobPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, job: WorkflowJob) -> JobKey {
        let key = JobKey(self.next_key);
        self.next_key += 1;
        debug!(key = %key, job = %job.kind, target = %job.target, "job pooled");
        self.jobs.insert(key, job);
        key
    }

    pub fn get(&self, key: JobKey) -> Option<&WorkflowJob> {
        self.jobs.get(&key)
    }

    pub fn get_mut(&mut self, key: JobKey) -> Option<&mut WorkflowJob> {
        self.jobs.get_mut(&key)
    }

    pub fn remove(&mut self, key: JobKey) -> Option<WorkflowJob> {
        self.jobs.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (JobKey, &WorkflowJob)> {
        self.jobs.iter().map(|(k, j)| (*k, j))
    }

    /// The live job of `kind` that `id` already participates in.
    pub fn find_for_dataset(&self, kind: JobKind, id: &DatasetId) -> Option<JobKey> {
        self.iter()
            .find(|(_, j)| j.kind == kind && j.participants.contains(id))
            .map(|(k, _)| k)
    }

    /// An existing job `new` duplicates: same kind, same experiment, model
    /// version and ensemble, neither ready, and each offering a dataset
    /// that fills one of the other's slots.
    pub fn find_matching_job(&self, new: &WorkflowJob, xref: &dyn CrossReference) -> Option<JobKey> {
        if new.is_ready() {
            return None;
        }
        let nf = new.target.facets();
        self.iter()
            .filter(|(_, j)| j.kind == new.kind && j.submission == SubmissionStatus::Pending)
            .filter(|(_, j)| !j.is_ready())
            .filter(|(_, j)| {
                let f = j.target.facets();
                f.experiment == nf.experiment
                    && normalize_model_version(&f.model_version)
                        == normalize_model_version(&nf.model_version)
                    && ensembles_match(&f.ensemble, &nf.ensemble)
            })
            .find(|(_, j)| offers_to(new, j, xref) && offers_to(j, new, xref))
            .map(|(k, _)| k)
    }

    /// Fold `new` into the pooled job `key`: its resolved datasets fill the
    /// existing slots and its participants join. `new` is discarded.
    pub fn merge_into(&mut self, key: JobKey, new: WorkflowJob, xref: &dyn CrossReference) -> bool {
        let Some(existing) = self.jobs.get_mut(&key) else {
            return false;
        };
        for candidate in new.offered() {
            if let Some(slot) = matches_requirement(existing, candidate, xref) {
                existing.fill(&slot, candidate.clone());
            }
        }
        for p in new.participants {
            existing.add_participant(p);
        }
        info!(key = %key, job = %existing.kind, participants = existing.participants.len(), ready = existing.is_ready(), "merged duplicate job");
        true
    }

    pub fn mark_submitted(&mut self, key: JobKey, job_id: JobId) {
        if let Some(job) = self.jobs.get_mut(&key) {
            job.job_id = Some(job_id);
            job.submission = SubmissionStatus::Submitted;
        }
    }

    /// Remove the submitted job with scheduler id `job_id`.
    pub fn retire_by_job_id(&mut self, job_id: &JobId) -> Option<WorkflowJob> {
        let key = self
            .iter()
            .find(|(_, j)| j.job_id.as_ref() == Some(job_id))
            .map(|(k, _)| k)?;
        let job = self.jobs.remove(&key);
        if let Some(job) = &job {
            info!(key = %key, job = %job.kind, job_id = %job_id, "job retired");
        }
        job
    }
}

fn offers_to(from: &WorkflowJob, to: &WorkflowJob, xref: &dyn CrossReference) -> bool {
    from.offered()
        .any(|c| matches_requirement(to, c, xref).is_some())
}

use std::sync::{Arc, Mutex};

use tracing::debug;

use warehouse::batch::{BatchScheduler, BoxFuture, JobInfo, RenderedScript};
use warehouse::errors::Result;
use warehouse::jobs::JobId;

/// What the next `submit` calls answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeMode {
    /// Hand out `fake-1`, `fake-2`, ...
    Accept,
    /// Behave like a scheduler that never returned an id.
    NoJobId,
}

#[derive(Debug, Default)]
struct State {
    submitted: Vec<RenderedScript>,
    cancelled: Vec<JobId>,
    reject: bool,
}

/// A fake scheduler that:
/// - records every submitted script
/// - hands out sequential job ids (or none, in `NoJobId` mode)
/// - reports every accepted, uncancelled job as queued
///
/// Clones share state, so a test keeps one clone to inspect while the
/// runtime owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeScheduler {
    state: Arc<Mutex<State>>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&self, mode: FakeMode) {
        self.state.lock().unwrap().reject = mode == FakeMode::NoJobId;
    }

    pub fn submitted(&self) -> Vec<RenderedScript> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().unwrap().submitted.len()
    }

    pub fn cancelled(&self) -> Vec<JobId> {
        self.state.lock().unwrap().cancelled.clone()
    }
}

impl BatchScheduler for FakeScheduler {
    fn submit(&self, script: RenderedScript) -> BoxFuture<'_, Result<Option<JobId>>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            debug!(script = %script.name, reject = state.reject, "fake submit");
            state.submitted.push(script);
            if state.reject {
                return Ok(None);
            }
            Ok(Some(JobId(format!("fake-{}", state.submitted.len()))))
        })
    }

    fn queue(&self) -> BoxFuture<'_, Result<Vec<JobInfo>>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            if state.reject {
                return Ok(Vec::new());
            }
            Ok(state
                .submitted
                .iter()
                .enumerate()
                .map(|(i, s)| JobInfo {
                    id: JobId(format!("fake-{}", i + 1)),
                    name: s.name.clone(),
                    state: "PENDING".to_string(),
                })
                .filter(|j| !state.cancelled.contains(&j.id))
                .collect())
        })
    }

    fn cancel(&self, id: JobId) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let known = state
                .submitted
                .iter()
                .enumerate()
                .any(|(i, _)| format!("fake-{}", i + 1) == id.0);
            if known {
                state.cancelled.push(id);
            }
            Ok(known)
        })
    }
}

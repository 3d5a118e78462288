// src/engine/core.rs

//! Core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - appends to dataset status logs (the only state it persists)
//! - lock markers around submitted jobs
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from the channel
//! - writing scripts and calling the batch scheduler
//! - reporting submission results back via [`CoreRuntime::record_submission`]
//!
//! The core owns the dataset map and the job pool outright. Nothing else
//! touches them, so the listener and the ticker only ever reach this state
//! through the runtime channel.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::batch::{RenderedScript, WrapperSpec, render_wrapper};
use crate::config::Settings;
use crate::dataset::{Dataset, DatasetId, DatasetStatus, companion_from_declared, lock};
use crate::engine::event_handlers::{CoreCommand, CoreStep, JobTicket};
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::errors::{Result, WarehouseError};
use crate::fs::FileSystem;
use crate::graph::{Transition, TransitionGraph};
use crate::jobs::{
    CrossReference, JOB_ID_PARAM, JobId, JobKey, JobKind, JobPool, RenderContext,
    SubmissionStatus, WorkflowJob, matches_requirement, render_command,
};
use crate::status::{Params, State, StatusEvent, Timestamp, Verb};

/// Upper bound on direct-write passes per evaluation. A graph whose direct
/// transitions loop back on themselves stops here instead of spinning.
const MAX_PASSES: usize = 32;

/// Outcome of one resolution attempt.
enum Readiness {
    Ready,
    /// A tracked dataset may still fill the open slot.
    Waiting,
}

/// Core runtime state.
///
/// This owns:
/// - the tracked datasets, keyed by id
/// - the job pool
/// - per `(dataset, job kind)` failure counters
///
/// It has **no** channels and no Tokio types.
pub struct CoreRuntime {
    graph: TransitionGraph,
    settings: Arc<Settings>,
    options: RuntimeOptions,
    datasets: BTreeMap<DatasetId, Dataset>,
    pool: JobPool,
    xref: Box<dyn CrossReference + Send + Sync>,
    fs: Arc<dyn FileSystem>,
    failures: HashMap<(DatasetId, JobKind), u32>,
}

impl std::fmt::Debug for CoreRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreRuntime")
            .field("namespace", &self.options.namespace)
            .field("datasets", &self.datasets.len())
            .field("jobs", &self.pool.len())
            .finish_non_exhaustive()
    }
}

impl CoreRuntime {
    /// Fails with a configuration error when the namespace is unknown or the
    /// graph can spawn a job kind that is not registered.
    pub fn new(
        graph: TransitionGraph,
        settings: Arc<Settings>,
        options: RuntimeOptions,
        datasets: Vec<Dataset>,
        xref: Box<dyn CrossReference + Send + Sync>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        graph.workflow(&options.namespace)?;
        let unknown: Vec<String> = graph
            .engaged_steps()
            .into_iter()
            .filter(|step| JobKind::from_name(step).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(WarehouseError::Configuration(format!(
                "transition graph spawns unknown job kinds: {}",
                unknown.join(", ")
            )));
        }

        Ok(Self {
            graph,
            settings,
            options,
            datasets: datasets.into_iter().map(|d| (d.id.clone(), d)).collect(),
            pool: JobPool::new(),
            xref,
            fs,
            failures: HashMap::new(),
        })
    }

    pub fn dataset(&self, id: &DatasetId) -> Option<&Dataset> {
        self.datasets.get(id)
    }

    pub fn datasets(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.values()
    }

    pub fn pool(&self) -> &JobPool {
        &self.pool
    }

    /// Scheduler ids of jobs this process submitted and has not yet seen
    /// finish.
    pub fn in_flight(&self) -> Vec<JobId> {
        self.pool
            .iter()
            .filter_map(|(_, j)| j.job_id.clone())
            .collect()
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    ///
    /// Dataset-scoped failures are logged and absorbed; only errors that
    /// must abort the run are returned.
    pub fn step(&mut self, event: RuntimeEvent) -> Result<CoreStep> {
        let commands = match event {
            RuntimeEvent::StatusChanged { dataset } => {
                if !self.datasets.contains_key(&dataset) {
                    debug!(dataset = %dataset, "change to an untracked status log ignored");
                    return Ok(CoreStep::running(Vec::new()));
                }
                self.evaluate_absorbing(&dataset)?
            }
            RuntimeEvent::Sweep => self.sweep()?,
            RuntimeEvent::ShutdownRequested => {
                info!("shutdown requested");
                return Ok(CoreStep::stop());
            }
        };
        Ok(self.finish(commands))
    }

    /// Re-evaluate every tracked dataset.
    pub fn sweep(&mut self) -> Result<Vec<CoreCommand>> {
        let ids: Vec<DatasetId> = self.datasets.keys().cloned().collect();
        debug!(datasets = ids.len(), jobs = self.pool.len(), "sweep");
        let mut commands = Vec::new();
        for id in ids {
            commands.extend(self.evaluate_absorbing(&id)?);
        }
        Ok(commands)
    }

    /// Whether every tracked dataset is settled for this namespace:
    /// workflow-level `Pass`/`Fail`, published, or in a state naming no
    /// workflow under this namespace.
    pub fn all_terminal(&self) -> bool {
        self.datasets.values().all(|d| self.is_settled(d))
    }

    /// Apply the outcome of a submission the shell performed for `key`.
    ///
    /// On success every participant's log gains an Engaged event carrying
    /// the job id. On failure the locks are released and the job goes back
    /// to pending; in strict mode the failure aborts the run, otherwise it
    /// counts toward `max_attempts`.
    pub fn record_submission(
        &mut self,
        ticket: &JobTicket,
        result: Result<Option<JobId>>,
    ) -> Result<CoreStep> {
        let key = ticket.key;
        let Some(job) = self.pool.get(key).cloned() else {
            warn!(key = %key, "submission result for a job no longer pooled");
            return Ok(CoreStep::running(Vec::new()));
        };

        let failure = match result {
            Ok(Some(job_id)) => {
                info!(job = %job.kind, job_id = %job_id, target = %job.target, participants = job.participants.len(), "job submitted");
                self.pool.mark_submitted(key, job_id.clone());
                let state = State::new(job.namespace.as_str(), job.kind.name(), Verb::Engaged);
                let event = StatusEvent::new(state)
                    .with_params(Params::new().with(JOB_ID_PARAM, job_id.0.as_str()))
                    .with_timestamp(ticket.engaged_at.clone());
                for p in &job.participants {
                    self.failures.remove(&(p.clone(), job.kind));
                    if let Some(ds) = self.datasets.get_mut(p) {
                        if let Err(e) = ds.append(&event) {
                            error!(dataset = %p, error = %e, "failed to record Engaged event");
                        }
                    }
                }
                return Ok(self.finish(Vec::new()));
            }
            Ok(None) => format!("scheduler returned no job id for {}", job.kind),
            Err(e) => format!("submitting {} failed: {e}", job.kind),
        };

        error!(job = %job.kind, target = %job.target, "{failure}");
        self.release_locks(&job.participants);
        if let Some(j) = self.pool.get_mut(key) {
            j.submission = SubmissionStatus::Pending;
        }
        if self.options.strict {
            return Err(WarehouseError::Submission(failure));
        }

        let mut commands = Vec::new();
        if self.record_failure(&job.target, job.kind, &failure) {
            self.pool.remove(key);
            let ids = job.participants.clone();
            self.fail_job(&job, &failure);
            for id in ids {
                commands.extend(self.evaluate_absorbing(&id)?);
            }
        }
        Ok(self.finish(commands))
    }

    /// Undo `try_submit` for a ticket the shell will never submit.
    pub fn abandon(&mut self, ticket: &JobTicket) {
        let Some(job) = self.pool.get_mut(ticket.key) else {
            return;
        };
        job.submission = SubmissionStatus::Pending;
        let participants = job.participants.clone();
        self.release_locks(&participants);
    }

    fn finish(&self, mut commands: Vec<CoreCommand>) -> CoreStep {
        if self.all_terminal() && !commands.iter().any(|c| matches!(c, CoreCommand::Submit(_))) {
            info!(datasets = self.datasets.len(), "every dataset is settled");
            commands.push(CoreCommand::RequestExit);
            return CoreStep {
                commands,
                keep_running: false,
            };
        }
        CoreStep::running(commands)
    }

    fn evaluate_absorbing(&mut self, id: &DatasetId) -> Result<Vec<CoreCommand>> {
        match self.evaluate_dataset(id) {
            Ok(commands) => Ok(commands),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(dataset = %id, error = %e, "dataset evaluation failed; will retry");
                Ok(Vec::new())
            }
        }
    }

    /// The per-dataset body.
    ///
    /// Re-reads the log, notices a finished job, skips gated, engaged and
    /// settled datasets, promotes ready markers, writes direct transitions
    /// and turns Engaged proposals into jobs. Repeats while direct writes
    /// keep moving the dataset.
    pub fn evaluate_dataset(&mut self, id: &DatasetId) -> Result<Vec<CoreCommand>> {
        let mut commands = Vec::new();

        for _ in 0..MAX_PASSES {
            let Some(ds) = self.datasets.get_mut(id) else {
                return Ok(commands);
            };
            ds.refresh()?;
            self.settle_finished_job(id)?;

            let Some(ds) = self.datasets.get(id) else {
                return Ok(commands);
            };
            if ds.snapshot().is_blocked() {
                debug!(dataset = %id, "blocked; skipping");
                return Ok(commands);
            }
            let Some(event) = ds.current_event().cloned() else {
                debug!(dataset = %id, "no status yet; skipping");
                return Ok(commands);
            };
            let state = event.state;
            if state.is_engaged() || state.verb == Verb::Hold {
                debug!(dataset = %id, %state, "waiting on an external party");
                return Ok(commands);
            }
            if self.is_done(&state) {
                return Ok(commands);
            }

            if let Some(ready) = self.promotion(&state)? {
                debug!(dataset = %id, from = %state, to = %ready, "promoting ready marker");
                self.append(id, StatusEvent::new(ready).with_params(event.params))?;
                continue;
            }

            if !self.graph.covers(&self.options.namespace, &state) {
                debug!(dataset = %id, %state, namespace = %self.options.namespace, "state outside this workflow; skipping");
                return Ok(commands);
            }

            let type_key = id.type_key();
            let next = self
                .graph
                .next_states(&self.options.namespace, &state, &type_key, &event.params)?;

            for transition in next {
                if transition.is_engaged() {
                    commands.extend(self.engage(id, &transition)?);
                } else {
                    debug!(dataset = %id, from = %state, to = %transition.state, "direct transition");
                    self.append(
                        id,
                        StatusEvent::new(transition.state).with_params(transition.params),
                    )?;
                }
            }
            // Direct writes and given-up jobs both move the dataset on.
            let moved = self
                .datasets
                .get(id)
                .and_then(Dataset::current_state)
                .is_some_and(|current| *current != state);
            if !moved {
                return Ok(commands);
            }
        }

        warn!(dataset = %id, passes = MAX_PASSES, "direct transitions did not converge");
        Ok(commands)
    }

    fn append(&mut self, id: &DatasetId, event: StatusEvent) -> Result<()> {
        match self.datasets.get_mut(id) {
            Some(ds) => ds.append(&event),
            None => Ok(()),
        }
    }

    /// `Pass`/`Fail` right after the Engaged event of the same step means
    /// the job recorded in that Engaged event finished: drop it from the
    /// pool and release this dataset's lock.
    fn settle_finished_job(&mut self, id: &DatasetId) -> Result<()> {
        let Some(ds) = self.datasets.get(id) else {
            return Ok(());
        };
        let (Some(last), Some(previous)) = ds.snapshot().last_two() else {
            return Ok(());
        };
        if !last.state.verb.is_terminal()
            || !previous.state.is_engaged()
            || last.state.major != previous.state.major
            || last.state.minor != previous.state.minor
        {
            return Ok(());
        }

        if let Some(job_id) = previous.params.get(JOB_ID_PARAM) {
            let job_id = JobId(job_id.to_string());
            if let Some(job) = self.pool.retire_by_job_id(&job_id) {
                self.failures.remove(&(job.target.clone(), job.kind));
            }
        }
        let dir = self.settings.roots.working_dir(id);
        if lock::is_locked(&dir) {
            info!(dataset = %id, verb = %last.state.verb, step = %last.state.minor, "job finished; releasing lock");
            lock::release(&dir)?;
        }
        Ok(())
    }

    /// Canonical ready state for an initial marker, when it differs from the
    /// current state.
    fn promotion(&self, state: &State) -> Result<Option<State>> {
        let root = self.graph.workflow(self.graph.root())?;
        let marker_verb = match &state.verb {
            Verb::Ready => true,
            Verb::Other(v) => {
                v == DatasetStatus::Uninitialized.as_str() || v == DatasetStatus::Unpublished.as_str()
            }
            _ => false,
        };
        if !(marker_verb && state.major == root.name && state.minor == root.step) {
            return Ok(None);
        }
        let ready = self.graph.workflow_state(&self.options.namespace, Verb::Ready)?;
        Ok((ready != *state).then_some(ready))
    }

    fn is_published_marker(&self, state: &State) -> bool {
        state.major == self.graph.root()
            && state.verb == DatasetStatus::Published.verb()
    }

    fn is_done(&self, state: &State) -> bool {
        self.graph.is_terminal(&self.options.namespace, state) || self.is_published_marker(state)
    }

    fn is_settled(&self, ds: &Dataset) -> bool {
        let Some(state) = ds.current_state() else {
            return false;
        };
        if self.is_done(state) {
            return true;
        }
        if state.is_engaged() || ds.snapshot().is_blocked() {
            return false;
        }
        matches!(self.promotion(state), Ok(None))
            && !self.graph.covers(&self.options.namespace, state)
    }

    /// Build, reuse or merge the job an Engaged proposal asks for and
    /// submit it once it is ready and unlocked.
    fn engage(&mut self, id: &DatasetId, transition: &Transition) -> Result<Vec<CoreCommand>> {
        let kind = JobKind::from_name(&transition.state.minor).ok_or_else(|| {
            WarehouseError::Configuration(format!(
                "no job kind named '{}'",
                transition.state.minor
            ))
        })?;

        let key = match self.pool.find_for_dataset(kind, id) {
            Some(key) => {
                let pending = self
                    .pool
                    .get(key)
                    .is_some_and(|j| j.submission == SubmissionStatus::Pending);
                if !pending {
                    debug!(dataset = %id, job = %kind, "job already with the scheduler");
                    return Ok(Vec::new());
                }
                key
            }
            None => {
                let job = WorkflowJob::new(kind, transition.state.major.as_str(), id.clone());
                match self.pool.find_matching_job(&job, self.xref.as_ref()) {
                    Some(existing) => {
                        self.pool.merge_into(existing, job, self.xref.as_ref());
                        existing
                    }
                    None => self.pool.insert(job),
                }
            }
        };

        match self.resolve(key) {
            Ok(Readiness::Ready) => {}
            Ok(Readiness::Waiting) => return Ok(Vec::new()),
            Err(WarehouseError::Resolution(msg)) => {
                warn!(dataset = %id, job = %kind, "{msg}");
                if self.record_failure(id, kind, &msg) {
                    if let Some(job) = self.pool.remove(key) {
                        self.fail_job(&job, &msg);
                    }
                }
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        }

        Ok(self.try_submit(key)?.map(CoreCommand::Submit).into_iter().collect())
    }

    /// Fill the open slots of a pooled job from its target, then from the
    /// target's companion native dataset.
    fn resolve(&mut self, key: JobKey) -> Result<Readiness> {
        let Some(job) = self.pool.get_mut(key) else {
            return Ok(Readiness::Waiting);
        };
        let xref = self.xref.as_ref();

        if let Some(slot) = matches_requirement(job, &job.target, xref) {
            let target = job.target.clone();
            job.fill(&slot, target);
        }

        if !job.is_ready() && job.kind.uses_companion(&job.target) {
            let declared = {
                let f = job.target.facets();
                xref.native_for(&f.model_version, &f.experiment)
            };
            let companion = companion_from_declared(&job.target, declared).ok_or_else(|| {
                WarehouseError::Resolution(format!(
                    "no companion native dataset is defined for {}",
                    job.target
                ))
            })?;
            if !job.holds(&companion) {
                let tracked = self.datasets.contains_key(&companion);
                if !tracked {
                    let found = Dataset::synthesized(
                        companion.clone(),
                        self.settings.roots.resolve(self.fs.as_ref(), &companion),
                    );
                    if !found.locations.is_populated() {
                        return Err(WarehouseError::Resolution(format!(
                            "companion {companion} of {} is not in any storage root",
                            job.target
                        )));
                    }
                    debug!(target = %job.target, companion = %companion, "synthesized companion dataset");
                }
                if let Some(slot) = matches_requirement(job, &companion, xref) {
                    job.fill(&slot, companion);
                }
            }
        }

        if job.is_ready() {
            return Ok(Readiness::Ready);
        }

        let job = job.clone();
        let could_fill = self.datasets.values().any(|d| {
            !job.participants.contains(&d.id)
                && !self.is_settled(d)
                && matches_requirement(&job, &d.id, self.xref.as_ref()).is_some()
        });
        if could_fill {
            debug!(job = %job.kind, target = %job.target, "waiting for a partner dataset");
            Ok(Readiness::Waiting)
        } else {
            let open: Vec<&str> = job
                .requirements
                .iter()
                .filter(|s| s.dataset.is_none())
                .map(|s| s.key.as_str())
                .collect();
            Err(WarehouseError::Resolution(format!(
                "no dataset can fill slot(s) {} of {} for {}",
                open.join(", "),
                job.kind,
                job.target
            )))
        }
    }

    /// Render the wrapper and place the locks. `None` when a participant's
    /// working directory is locked.
    fn try_submit(&mut self, key: JobKey) -> Result<Option<JobTicket>> {
        let Some(job) = self.pool.get(key) else {
            return Ok(None);
        };
        if !job.is_ready() || job.submission != SubmissionStatus::Pending {
            return Ok(None);
        }

        let roots = &self.settings.roots;
        if let Some(locked) = job
            .participants
            .iter()
            .find(|p| lock::is_locked(&roots.working_dir(p)))
        {
            debug!(job = %job.kind, dataset = %locked, "working directory locked; deferring");
            return Ok(None);
        }

        let template = self.settings.command_template(job.kind).ok_or_else(|| {
            WarehouseError::Configuration(format!("no [jobs.{}] command template", job.kind))
        })?;
        let Some(target) = self.datasets.get(&job.target) else {
            return Ok(None);
        };
        let command = render_command(
            template,
            &RenderContext {
                job,
                target,
                roots,
            },
        )?;

        let status_logs: Vec<_> = job
            .participants
            .iter()
            .filter_map(|p| self.datasets.get(p).and_then(Dataset::log_path))
            .collect();
        let name = format!("{}-{}", job.kind, job.target);
        let body = render_wrapper(&WrapperSpec {
            name: &name,
            command: &command,
            major: &job.namespace,
            minor: job.kind.name(),
            status_logs: &status_logs,
            directives: &self.settings.scheduler.directives,
        });
        let script = RenderedScript {
            path: self.settings.scripts_dir.join(format!("{name}.sh")),
            name,
            body,
        };

        let participants = job.participants.clone();
        let mut acquired = Vec::new();
        for p in &participants {
            if lock::acquire(&roots.working_dir(p))? {
                acquired.push(p.clone());
            } else {
                debug!(dataset = %p, "lock taken concurrently; deferring");
                self.release_locks(&acquired);
                return Ok(None);
            }
        }

        if let Some(job) = self.pool.get_mut(key) {
            job.submission = SubmissionStatus::Submitting;
        }
        Ok(Some(JobTicket {
            key,
            script,
            engaged_at: Timestamp::now(),
        }))
    }

    fn release_locks(&self, ids: &[DatasetId]) {
        for id in ids {
            if let Err(e) = lock::release(&self.settings.roots.working_dir(id)) {
                warn!(dataset = %id, error = %e, "failed to release lock");
            }
        }
    }

    /// Count one failure. Returns `true` once the budget is spent, resetting
    /// the counter.
    fn record_failure(&mut self, id: &DatasetId, kind: JobKind, msg: &str) -> bool {
        let count = self.failures.entry((id.clone(), kind)).or_insert(0);
        *count += 1;
        if *count < self.options.max_attempts {
            info!(dataset = %id, job = %kind, attempt = *count, max = self.options.max_attempts, "attempt failed: {msg}");
            return false;
        }
        self.failures.remove(&(id.clone(), kind));
        true
    }

    /// Write `<namespace>:<kind>:Fail` with `msg` to every participant.
    fn fail_job(&mut self, job: &WorkflowJob, msg: &str) {
        let state = State::new(job.namespace.as_str(), job.kind.name(), Verb::Fail);
        let event = StatusEvent::new(state).with_message(msg);
        for p in &job.participants {
            error!(dataset = %p, job = %job.kind, "giving up: {msg}");
            if let Some(ds) = self.datasets.get_mut(p) {
                if let Err(e) = ds.append(&event) {
                    error!(dataset = %p, error = %e, "failed to record Fail event");
                }
            }
        }
    }
}

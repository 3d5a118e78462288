// src/engine/runtime.rs

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{debug, info, warn};

use crate::batch::BatchScheduler;
use crate::errors::{Result, WarehouseError};

use super::core::CoreRuntime;
use super::{CoreCommand, CoreStep, JobTicket, RuntimeEvent};

/// Feeds `RuntimeEvent`s to the core and carries out its commands against a
/// [`BatchScheduler`].
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// advancement semantics. This struct handles async IO: reading events from
/// the channel, writing scripts, and submitting them with a timeout so a
/// scheduler that blocks until job completion cannot stall the loop.
pub struct Runtime<S: BatchScheduler> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    scheduler: S,
    submit_timeout: Duration,
}

impl<S: BatchScheduler> fmt::Debug for Runtime<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("submit_timeout", &self.submit_timeout)
            .finish_non_exhaustive()
    }
}

impl<S: BatchScheduler> Runtime<S> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        scheduler: S,
        submit_timeout: Duration,
    ) -> Self {
        Self {
            core,
            event_rx,
            scheduler,
            submit_timeout,
        }
    }

    pub fn core(&self) -> &CoreRuntime {
        &self.core
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core.
    /// - Submits the jobs the core hands back.
    ///
    /// Returns the core once every dataset is settled, on shutdown, or when
    /// the channel closes.
    pub async fn run(mut self) -> Result<CoreRuntime> {
        info!("warehouse runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            if event == RuntimeEvent::Sweep {
                self.observe_queue().await;
            }

            let step = self.core.step(event)?;
            let mut keep_running = step.keep_running;
            let mut pending: VecDeque<CoreCommand> = step.commands.into();

            while let Some(command) = pending.pop_front() {
                match command {
                    CoreCommand::Submit(ticket) => match self.submit(ticket).await {
                        Ok(follow_up) => {
                            keep_running = follow_up.keep_running;
                            pending.extend(follow_up.commands);
                        }
                        Err(e) => {
                            for command in pending {
                                if let CoreCommand::Submit(t) = command {
                                    self.core.abandon(&t);
                                }
                            }
                            return Err(e);
                        }
                    },
                    CoreCommand::RequestExit => {
                        info!("core issued RequestExit command");
                        keep_running = false;
                    }
                }
            }

            if !keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(self.core)
    }

    async fn submit(&mut self, ticket: JobTicket) -> Result<CoreStep> {
        debug!(script = ?ticket.script.path, "submitting job script");
        let result = match ticket.script.write().await {
            Ok(()) => match timeout(self.submit_timeout, self.scheduler.submit(ticket.script.clone())).await {
                Ok(r) => r,
                Err(_) => Err(WarehouseError::Submission(format!(
                    "scheduler did not answer within {:?}",
                    self.submit_timeout
                ))),
            },
            Err(e) => Err(e),
        };
        self.core.record_submission(&ticket, result)
    }

    /// Log submitted jobs the scheduler no longer lists. Their terminal
    /// event should already be on its way; nothing is changed here.
    async fn observe_queue(&self) {
        let in_flight = self.core.in_flight();
        if in_flight.is_empty() {
            return;
        }
        match timeout(self.submit_timeout, self.scheduler.queue()).await {
            Ok(Ok(queue)) => {
                let queued: HashSet<_> = queue.into_iter().map(|j| j.id).collect();
                for id in in_flight.iter().filter(|id| !queued.contains(*id)) {
                    debug!(job_id = %id, "job left the queue; awaiting its terminal event");
                }
            }
            Ok(Err(e)) => warn!(error = %e, "failed to query scheduler queue"),
            Err(_) => warn!("scheduler queue query timed out"),
        }
    }
}

/// Send `RuntimeEvent::Sweep` every `interval` until the channel closes.
pub fn spawn_sweep_ticker(tx: mpsc::Sender<RuntimeEvent>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; startup already sends a sweep.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if tx.send(RuntimeEvent::Sweep).await.is_err() {
                debug!("runtime channel closed; stopping sweep ticker");
                return;
            }
        }
    })
}

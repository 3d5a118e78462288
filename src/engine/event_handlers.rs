// src/engine/event_handlers.rs

//! Commands and step results exchanged between the core and the IO shell.

use crate::batch::RenderedScript;
use crate::jobs::JobKey;
use crate::status::Timestamp;

/// A ready job the shell should hand to the scheduler.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub key: JobKey,
    pub script: RenderedScript,
    /// Timestamp for the Engaged events, taken before submission so they
    /// always sort ahead of the job's own terminal event.
    pub engaged_at: Timestamp,
}

/// Command produced by the core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Write the script and submit it; report back through
    /// `CoreRuntime::record_submission`.
    Submit(JobTicket),
    /// Every tracked dataset is settled.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn running(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    pub fn stop() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: false,
        }
    }

    /// Tickets in this step, in order.
    pub fn submissions(&self) -> impl Iterator<Item = &JobTicket> {
        self.commands.iter().filter_map(|c| match c {
            CoreCommand::Submit(t) => Some(t),
            CoreCommand::RequestExit => None,
        })
    }
}

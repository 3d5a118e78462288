// src/engine/mod.rs

//! Orchestrator driver for warehouse.
//!
//! This module ties together:
//! - dataset discovery and initial status (`initialize`, read-only `preview`)
//! - the per-dataset advancement body and the job pool (`core`)
//! - the main runtime event loop that reacts to:
//!   - status-log changes reported by the listener
//!   - periodic sweeps
//!   - shutdown signals
//!
//! The synchronous core state machine lives in [`core`]; the async/IO shell
//! that talks to the batch scheduler is implemented in [`runtime`].

use crate::dataset::DatasetId;

/// Events flowing into the runtime from the listener, the sweep ticker and
/// the Ctrl-C handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// A dataset's status log was written.
    StatusChanged { dataset: DatasetId },
    /// Re-evaluate every tracked dataset.
    Sweep,
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Runtime options used by the core.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Workflow namespace this run advances datasets through.
    pub namespace: String,
    /// Submission failures abort the run.
    pub strict: bool,
    pub max_attempts: u32,
}

pub mod core;
pub mod event_handlers;
pub mod initialize;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep, JobTicket};
pub use initialize::{DatasetFilter, Preview, initialize, preview};
pub use runtime::{Runtime, spawn_sweep_ticker};

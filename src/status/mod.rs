// src/status/mod.rs

//! Per-dataset status journal.
//!
//! The log is the single source of truth for pipeline state. Nothing in the
//! crate caches a dataset's state without being able to rebuild it from here.
//!
//! - [`event`] holds the structured event types and the `STAT:` line codec.
//! - [`log`] reads and appends the on-disk file.
//! - [`snapshot`] derives the current state and gate toggles from events.

pub mod event;
pub mod log;
pub mod snapshot;

pub use event::{LogLine, Params, State, StatusEvent, Timestamp, Verb};
pub use log::{STATUS_FILE_SUFFIX, StatusLog, read_identity, status_path};
pub use snapshot::StatusSnapshot;

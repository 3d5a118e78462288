// src/dataset/mod.rs

//! A dataset: identity, storage locations, status log handle.

pub mod companion;
pub mod id;
pub mod lock;
pub mod storage;

use std::path::PathBuf;

use anyhow::anyhow;

use crate::errors::Result;
use crate::status::{State, StatusEvent, StatusLog, StatusSnapshot, Verb};

pub use companion::{companion_from_declared, companion_native_id};
pub use id::{DatasetId, Encoding, Facets};
pub use storage::{StorageLocations, StorageRoots};

/// Initial status markers written once at discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetStatus {
    /// Nowhere on disk and unknown to the index.
    Uninitialized,
    /// Present in staging only.
    Unpublished,
    /// Found in the index or the publication root.
    Published,
}

impl DatasetStatus {
    pub fn verb(&self) -> Verb {
        Verb::Other(self.as_str().to_string())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Uninitialized => "Uninitialized",
            DatasetStatus::Unpublished => "Unpublished",
            DatasetStatus::Published => "Published",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: DatasetId,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    /// Time-series variables, or the one variable of a derived dataset.
    pub variables: Vec<String>,
    pub locations: StorageLocations,
    /// `None` for synthesized companions.
    log: Option<StatusLog>,
    snapshot: StatusSnapshot,
}

impl Dataset {
    pub fn new(id: DatasetId, log: StatusLog) -> Self {
        Self {
            id,
            start_year: None,
            end_year: None,
            variables: Vec::new(),
            locations: StorageLocations::default(),
            log: Some(log),
            snapshot: StatusSnapshot::default(),
        }
    }

    /// A companion built on demand by the resolver, with no status log.
    pub fn synthesized(id: DatasetId, locations: StorageLocations) -> Self {
        Self {
            id,
            start_year: None,
            end_year: None,
            variables: Vec::new(),
            locations,
            log: None,
            snapshot: StatusSnapshot::default(),
        }
    }

    pub fn is_synthesized(&self) -> bool {
        self.log.is_none()
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.log.as_ref().map(|l| l.path().to_path_buf())
    }

    /// Re-read the status log. The cached snapshot is never authoritative.
    pub fn refresh(&mut self) -> Result<()> {
        if let Some(log) = &self.log {
            self.snapshot = log.snapshot()?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    pub fn current_state(&self) -> Option<&State> {
        self.snapshot.current_state()
    }

    pub fn current_event(&self) -> Option<&StatusEvent> {
        self.snapshot.current_event()
    }

    /// Append to the status log and refresh.
    pub fn append(&mut self, event: &StatusEvent) -> Result<()> {
        let log = self
            .log
            .as_ref()
            .ok_or_else(|| anyhow!("dataset {} has no status log", self.id))?;
        log.append(event)?;
        self.refresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::status_path;

    #[test]
    fn append_refreshes_current_state() {
        let tmp = tempfile::tempdir().unwrap();
        let id = DatasetId::parse("E3SM.1_0.historical.LR.atmos.native.model-output.mon.ens1")
            .unwrap();
        let log = StatusLog::open(status_path(tmp.path(), id.as_str()), id.as_str()).unwrap();
        let mut ds = Dataset::new(id, log);
        ds.refresh().unwrap();
        assert!(ds.current_state().is_none());

        let state: State = "POSTPROCESS:ClimoGen:Ready".parse().unwrap();
        ds.append(&StatusEvent::new(state.clone())).unwrap();
        assert_eq!(ds.current_state(), Some(&state));
    }

    #[test]
    fn synthesized_datasets_cannot_be_written() {
        let id = DatasetId::parse("E3SM.1_0.historical.LR.atmos.native.model-output.mon.ens1")
            .unwrap();
        let mut ds = Dataset::synthesized(id, StorageLocations::default());
        let state: State = "POSTPROCESS:ClimoGen:Ready".parse().unwrap();
        assert!(ds.append(&StatusEvent::new(state)).is_err());
    }
}

// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only `Configuration` errors (and `Submission` errors in strict mode) are
//! process-fatal; everything else stays scoped to the dataset it came from.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WarehouseError {
    /// Transition graph, catalog or settings are incomplete or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A job's input datasets could not be resolved.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// The batch scheduler did not hand back a job id.
    #[error("Submission error: {0}")]
    Submission(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WarehouseError {
    /// Errors that must abort the whole run regardless of mode.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WarehouseError::Configuration(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WarehouseError>;

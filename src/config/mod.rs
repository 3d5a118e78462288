// src/config/mod.rs

//! Settings loading and validation for warehouse.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a settings file and apply CLI overrides (`loader.rs`).
//! - Validate and resolve into [`Settings`] (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{Overrides, default_config_path, load_from_path, load_settings};
pub use model::{RawSettings, RunSettings, SchedulerSettings, Settings};

// src/watch/mod.rs

//! Change Listener.
//!
//! Watches the status root for writes to status logs and turns each into a
//! `RuntimeEvent::StatusChanged` for the dataset named by the log's
//! identity marker. It never interprets log contents beyond that marker.

pub mod event_handler;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use patterns::StatusFilePattern;
pub use watcher::{ListenerHandle, spawn_listener};

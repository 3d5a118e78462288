// src/dataset/lock.rs

//! Zero-byte `.lock` marker in a dataset's working directory.
//!
//! Advisory only: it keeps this process from submitting two jobs against
//! the same working directory. It is not a mutual-exclusion primitive
//! between processes; a single coordinating process per storage tree is
//! assumed.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::Result;

pub const LOCK_FILE_NAME: &str = ".lock";

pub fn lock_path(working_dir: &Path) -> PathBuf {
    working_dir.join(LOCK_FILE_NAME)
}

pub fn is_locked(working_dir: &Path) -> bool {
    lock_path(working_dir).exists()
}

/// Place the marker. Returns `false` when it was already present.
pub fn acquire(working_dir: &Path) -> Result<bool> {
    fs::create_dir_all(working_dir)?;
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path(working_dir))
    {
        Ok(_) => {
            debug!(dir = ?working_dir, "lock acquired");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Remove the marker; a missing marker is not an error.
pub fn release(working_dir: &Path) -> Result<()> {
    match fs::remove_file(lock_path(working_dir)) {
        Ok(()) => {
            debug!(dir = ?working_dir, "lock released");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

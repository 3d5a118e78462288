// src/watch/patterns.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::status::STATUS_FILE_SUFFIX;

/// Compiled glob set selecting status-log files below the watched root.
///
/// Paths passed to [`StatusFilePattern::matches`] are relative to the root
/// and use forward slashes.
#[derive(Clone)]
pub struct StatusFilePattern {
    include: GlobSet,
    exclude: Option<GlobSet>,
}

impl fmt::Debug for StatusFilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusFilePattern").finish_non_exhaustive()
    }
}

impl StatusFilePattern {
    /// `*.status` anywhere below the root; editor swap files and dotfiles
    /// are excluded.
    pub fn new() -> Result<Self> {
        Self::from_patterns(
            &[format!("**/*.{STATUS_FILE_SUFFIX}")],
            &["**/.*".to_string()],
        )
    }

    pub fn from_patterns(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = build_globset(include).context("building status include globset")?;
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building status exclude globset")?)
        };
        Ok(Self { include, exclude })
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        self.include.is_match(rel_path)
            && !self.exclude.as_ref().is_some_and(|ex| ex.is_match(rel_path))
    }
}

/// Build a GlobSet from simple string patterns.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

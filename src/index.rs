// src/index.rs

//! Publication index collaborator.
//!
//! Answers "is this dataset already published?" before the filesystem is
//! consulted. `None` means the index has no opinion.

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::dataset::DatasetId;
use crate::errors::Result;
use crate::fs::FileSystem;

pub trait PublicationIndex: Send + Sync {
    fn is_published(&self, id: &DatasetId) -> Option<bool>;
}

/// No index configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIndex;

impl PublicationIndex for NoIndex {
    fn is_published(&self, _id: &DatasetId) -> Option<bool> {
        None
    }
}

/// Plain-text list of published dataset ids, one per line. Blank lines and
/// `#` comments are ignored.
#[derive(Debug, Clone, Default)]
pub struct ListIndex {
    published: HashSet<String>,
}

impl ListIndex {
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        let contents = fs.read_to_string(path)?;
        let index = Self::parse(&contents);
        debug!(path = ?path, count = index.published.len(), "loaded publication index");
        Ok(index)
    }

    pub fn parse(contents: &str) -> Self {
        let published = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { published }
    }
}

impl PublicationIndex for ListIndex {
    fn is_published(&self, id: &DatasetId) -> Option<bool> {
        Some(self.published.contains(id.as_str()))
    }
}

// src/engine/initialize.rs

//! Dataset discovery and initial status.
//!
//! Every catalog entry that passes the operator's filter becomes a
//! [`Dataset`] with an open status log. A log that holds no events yet gets
//! exactly one initial marker, chosen from the publication index, then the
//! publication root, then the staging root.

use std::path::Path;

use anyhow::Context;
use globset::GlobSet;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::catalog::{Catalog, CatalogEntry};
use crate::config::Settings;
use crate::dataset::{Dataset, DatasetId, DatasetStatus, StorageRoots};
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::graph::TransitionGraph;
use crate::index::PublicationIndex;
use crate::status::{State, StatusEvent, StatusLog, status_path};
use crate::watch::patterns::build_globset;

/// Glob filter over dataset ids. No patterns means everything passes.
#[derive(Debug, Clone)]
pub struct DatasetFilter {
    set: Option<GlobSet>,
}

impl DatasetFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self { set: None });
        }
        let set = build_globset(patterns).context("compiling dataset id filters")?;
        Ok(Self { set: Some(set) })
    }

    pub fn matches(&self, id: &DatasetId) -> bool {
        self.set.as_ref().is_none_or(|s| s.is_match(id.as_str()))
    }
}

/// Read-only inputs shared by every discovery worker.
struct Discovery<'a> {
    graph: &'a TransitionGraph,
    roots: &'a StorageRoots,
    status_root: &'a Path,
    index: &'a dyn PublicationIndex,
    fs: &'a dyn FileSystem,
}

impl Discovery<'_> {
    fn load(&self, entry: &CatalogEntry, log: StatusLog) -> Result<Dataset> {
        let mut ds = Dataset::new(entry.id.clone(), log);
        ds.start_year = Some(entry.start_year);
        ds.end_year = Some(entry.end_year);
        ds.variables = entry.variables.clone();
        ds.locations = self.roots.resolve(self.fs, &ds.id);
        ds.refresh()?;
        Ok(ds)
    }

    fn discover(&self, entry: &CatalogEntry) -> Result<Dataset> {
        let id = entry.id.as_str();
        let log = StatusLog::open(status_path(self.status_root, id), id)?;
        let mut ds = self.load(entry, log)?;

        if ds.snapshot().is_empty() {
            let state = self.initial_state(&ds)?;
            debug!(dataset = %ds.id, %state, "writing initial status");
            ds.append(&StatusEvent::new(state))?;
        }
        Ok(ds)
    }

    fn preview(&self, entry: &CatalogEntry) -> Result<Preview> {
        let log = StatusLog::at(status_path(self.status_root, entry.id.as_str()));
        let dataset = self.load(entry, log)?;
        let state = if dataset.snapshot().is_empty() {
            Some(self.initial_state(&dataset)?)
        } else {
            dataset.current_state().cloned()
        };
        Ok(Preview { dataset, state })
    }

    fn initial_state(&self, ds: &Dataset) -> Result<State> {
        let status = self.initial_status(ds);
        self.graph.workflow_state(self.graph.root(), status.verb())
    }

    fn initial_status(&self, ds: &Dataset) -> DatasetStatus {
        if self.index.is_published(&ds.id) == Some(true) || ds.locations.publication.is_some() {
            DatasetStatus::Published
        } else if ds.locations.staging.is_some() {
            DatasetStatus::Unpublished
        } else {
            DatasetStatus::Uninitialized
        }
    }
}

/// A dataset as discovery would leave it, computed without touching disk.
#[derive(Debug)]
pub struct Preview {
    pub dataset: Dataset,
    /// Current binding state, or the initial marker a real run would write.
    pub state: Option<State>,
}

/// Build the tracked dataset set.
///
/// Status lookups run on a bounded rayon pool of `settings.run.workers`
/// threads, or on the calling thread in serial mode; both produce the same
/// datasets in catalog order.
pub fn initialize(
    settings: &Settings,
    graph: &TransitionGraph,
    catalog: &Catalog,
    index: &dyn PublicationIndex,
    fs: &dyn FileSystem,
) -> Result<Vec<Dataset>> {
    let discovery = Discovery::new(settings, graph, index, fs);
    let datasets = for_each_entry(settings, catalog, |e| discovery.discover(e))?;
    info!(count = datasets.len(), "datasets initialized");
    Ok(datasets)
}

/// Same selection and initial status as [`initialize`], but read-only: no
/// status log is created and no marker is written.
pub fn preview(
    settings: &Settings,
    graph: &TransitionGraph,
    catalog: &Catalog,
    index: &dyn PublicationIndex,
    fs: &dyn FileSystem,
) -> Result<Vec<Preview>> {
    let discovery = Discovery::new(settings, graph, index, fs);
    for_each_entry(settings, catalog, |e| discovery.preview(e))
}

impl<'a> Discovery<'a> {
    fn new(
        settings: &'a Settings,
        graph: &'a TransitionGraph,
        index: &'a dyn PublicationIndex,
        fs: &'a dyn FileSystem,
    ) -> Self {
        Self {
            graph,
            roots: &settings.roots,
            status_root: &settings.status_root,
            index,
            fs,
        }
    }
}

fn for_each_entry<T, F>(settings: &Settings, catalog: &Catalog, work: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(&CatalogEntry) -> Result<T> + Sync,
{
    let filter = DatasetFilter::new(&settings.run.dataset_filters)?;
    let entries: Vec<&CatalogEntry> = catalog
        .expand()
        .iter()
        .filter(|e| filter.matches(&e.id))
        .collect();
    info!(
        candidates = catalog.expand().len(),
        selected = entries.len(),
        serial = settings.run.serial,
        "discovering datasets"
    );

    let results: Vec<Result<T>> = if settings.run.serial {
        entries.iter().map(|e| work(e)).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.run.workers)
            .thread_name(|idx| format!("warehouse-discover-{idx}"))
            .build()
            .context("building discovery thread pool")?;
        pool.install(|| entries.par_iter().map(|e| work(e)).collect())
    };

    results.into_iter().collect()
}

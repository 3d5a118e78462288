#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use warehouse::catalog::Catalog;
use warehouse::config::{RawSettings, Settings};
use warehouse::config::model::RawJob;
use warehouse::dataset::storage::facet_path;
use warehouse::dataset::{Dataset, DatasetId, lock};
use warehouse::engine::{CoreRuntime, RuntimeOptions, initialize};
use warehouse::fs::{FileSystem, RealFileSystem};
use warehouse::graph::TransitionGraph;
use warehouse::index::NoIndex;
use warehouse::status::{State, StatusEvent, StatusLog, status_path};

/// Root workflow delegating to a POSTPROCESS child that spawns `ClimoGen`
/// for monthly native atmosphere, `MpasAnalysis` for monthly native ocean
/// and sea ice, and passes every other type straight through.
pub const POSTPROCESS_GRAPH: &str = r#"
root = "WAREHOUSE"

[workflow.WAREHOUSE]
step = "DATASET"
children = ["POSTPROCESS"]

[workflow.WAREHOUSE.transitions."DATASET:Ready"]
default = ["POSTPROCESS:Ready"]

[workflow.WAREHOUSE.transitions."POSTPROCESS:Pass"]
default = ["Pass"]

[workflow.WAREHOUSE.transitions."POSTPROCESS:Fail"]
default = ["Fail"]

[workflow.POSTPROCESS.transitions."POSTPROCESS:Ready"]
"atmos-native-mon" = ["ClimoGen:Engaged"]
"ocean-native-mon" = ["MpasAnalysis:Engaged"]
"seaice-native-mon" = ["MpasAnalysis:Engaged"]
default = ["Pass"]

[workflow.POSTPROCESS.transitions."ClimoGen:Pass"]
default = ["Pass"]

[workflow.POSTPROCESS.transitions."ClimoGen:Fail"]
default = ["Fail"]

[workflow.POSTPROCESS.transitions."MpasAnalysis:Pass"]
default = ["Pass"]

[workflow.POSTPROCESS.transitions."MpasAnalysis:Fail"]
default = ["Fail"]
"#;

/// One E3SM piControl ensemble member with monthly native atmosphere,
/// ocean and sea-ice output.
pub const NATIVE_CATALOG: &str = r#"
[[native]]
project = "E3SM"
model_version = "1_0"
resolution = "LR"
types = [
    { realm = "atmos", grid = "native", data_type = "model-output", freq = "mon" },
    { realm = "ocean", grid = "native", data_type = "model-output", freq = "mon" },
    { realm = "sea-ice", grid = "native", data_type = "model-output", freq = "mon" },
]

[native.experiments.piControl]
start = 1
end = 50
ensembles = ["ens1"]
"#;

pub const ATMOS_ID: &str = "E3SM.1_0.piControl.LR.atmos.native.model-output.mon.ens1";
pub const OCEAN_ID: &str = "E3SM.1_0.piControl.LR.ocean.native.model-output.mon.ens1";
pub const SEAICE_ID: &str = "E3SM.1_0.piControl.LR.sea-ice.native.model-output.mon.ens1";

pub fn id(raw: &str) -> DatasetId {
    DatasetId::parse(raw).expect("valid dataset id")
}

pub fn state(raw: &str) -> State {
    raw.parse().expect("valid state")
}

/// A scratch storage tree with settings pointing into it.
pub struct TestWorld {
    pub dir: tempfile::TempDir,
    pub settings: Settings,
}

/// Builder for `Settings` rooted in a temporary directory.
pub struct SettingsBuilder {
    root: PathBuf,
    raw: RawSettings,
}

impl SettingsBuilder {
    pub fn new(root: &Path) -> Self {
        let mut raw = RawSettings::default();
        raw.paths.staging = Some(root.join("staging"));
        raw.paths.publication = Some(root.join("publication"));
        raw.paths.archive = Some(root.join("archive"));
        raw.paths.status_root = Some(root.join("status"));
        raw.paths.catalog = Some(root.join("catalog.toml"));
        raw.paths.graph = Some(root.join("graph.toml"));
        raw.run.workers = Some(2);
        Self {
            root: root.to_path_buf(),
            raw,
        }
    }

    pub fn job(mut self, kind: &str, command: &str) -> Self {
        self.raw.jobs.insert(
            kind.to_string(),
            RawJob {
                command: command.to_string(),
            },
        );
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.raw.run.max_attempts = Some(n);
        self
    }

    pub fn strict(mut self) -> Self {
        self.raw.run.strict = true;
        self
    }

    pub fn serial(mut self) -> Self {
        self.raw.run.serial = true;
        self
    }

    pub fn filter(mut self, glob: &str) -> Self {
        self.raw.run.dataset_ids.push(glob.to_string());
        self
    }

    pub fn build(self) -> Settings {
        for dir in ["staging", "publication", "archive", "status"] {
            fs::create_dir_all(self.root.join(dir)).expect("create storage root");
        }
        Settings::try_from(self.raw).expect("Failed to build valid settings from builder")
    }
}

impl TestWorld {
    /// Default world: every job kind in the fixtures has a trivial command.
    pub fn new() -> Self {
        Self::with(|b| b)
    }

    pub fn with(configure: impl FnOnce(SettingsBuilder) -> SettingsBuilder) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let builder = SettingsBuilder::new(dir.path())
            .job("ClimoGen", "ncclimo -s {start} -e {end} -i {input:*-native-mon}")
            .job("MpasAnalysis", "mpas_analysis {input:ocean-native-mon} {input:seaice-native-mon}");
        let settings = configure(builder).build();
        Self { dir, settings }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Put one file into `<staging>/<facet path>/<version>/`.
    pub fn stage(&self, raw_id: &str, version: &str) {
        let dir = self
            .settings
            .roots
            .staging
            .join(facet_path(&id(raw_id)))
            .join(version);
        fs::create_dir_all(&dir).expect("create version dir");
        fs::write(dir.join("data.nc"), b"x").expect("write data file");
    }

    pub fn publish(&self, raw_id: &str, version: &str) {
        let dir = self
            .settings
            .roots
            .publication
            .join(facet_path(&id(raw_id)))
            .join(version);
        fs::create_dir_all(&dir).expect("create version dir");
        fs::write(dir.join("data.nc"), b"x").expect("write data file");
    }

    pub fn working_dir(&self, raw_id: &str) -> PathBuf {
        self.settings.roots.working_dir(&id(raw_id))
    }

    pub fn is_locked(&self, raw_id: &str) -> bool {
        lock::is_locked(&self.working_dir(raw_id))
    }

    pub fn log(&self, raw_id: &str) -> StatusLog {
        StatusLog::open(status_path(&self.settings.status_root, raw_id), raw_id)
            .expect("open status log")
    }

    /// Append `state` to a dataset's log the way an external job would.
    pub fn write_state(&self, raw_id: &str, raw_state: &str) {
        self.log(raw_id)
            .append(&StatusEvent::new(state(raw_state)))
            .expect("append status");
    }

    pub fn current_state(&self, raw_id: &str) -> Option<String> {
        self.log(raw_id)
            .snapshot()
            .expect("read status log")
            .current_state()
            .map(ToString::to_string)
    }

    pub fn events(&self, raw_id: &str) -> Vec<StatusEvent> {
        self.log(raw_id).events().expect("read status log")
    }

    pub fn graph(&self, toml: &str) -> TransitionGraph {
        TransitionGraph::from_toml_str(toml).expect("valid graph")
    }

    pub fn catalog(&self, toml: &str) -> Catalog {
        Catalog::from_toml_str(toml).expect("valid catalog")
    }

    pub fn datasets(&self, graph: &TransitionGraph, catalog: &Catalog) -> Vec<Dataset> {
        initialize(&self.settings, graph, catalog, &NoIndex, &RealFileSystem)
            .expect("initialize datasets")
    }

    /// Core for `namespace` over the fixture graph and catalog.
    pub fn core(&self, namespace: &str) -> CoreRuntime {
        self.core_with(namespace, POSTPROCESS_GRAPH, NATIVE_CATALOG)
    }

    pub fn core_with(&self, namespace: &str, graph_toml: &str, catalog_toml: &str) -> CoreRuntime {
        let graph = self.graph(graph_toml);
        let catalog = self.catalog(catalog_toml);
        let datasets = self.datasets(&graph, &catalog);
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        CoreRuntime::new(
            graph,
            Arc::new(self.settings.clone()),
            RuntimeOptions {
                namespace: namespace.to_string(),
                strict: self.settings.run.strict,
                max_attempts: self.settings.run.max_attempts,
            },
            datasets,
            Box::new(catalog),
            fs,
        )
        .expect("valid core")
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

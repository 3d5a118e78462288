// src/catalog/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Dataset catalog as read from TOML.
///
/// ```toml
/// [variables]
/// atmos = ["tas", "pr"]
///
/// [variables.exclude]
/// piControl = ["pr"]
///
/// [[native]]
/// project = "E3SM"
/// model_version = "1_0"
/// resolution = "1deg_atm_60-30km_ocean"
/// types = [{ realm = "atmos", grid = "native", data_type = "model-output", freq = "mon" }]
///
/// [native.experiments.piControl]
/// start = 1
/// end = 500
/// ensembles = ["ens1"]
///
/// [[cmip]]
/// activity = "CMIP"
/// institution = "E3SM-Project"
/// source = "E3SM-1-0"
/// grid = "gr"
/// tables = { Amon = ["tas"] }
///
/// [cmip.experiments.piControl]
/// start = 1
/// end = 500
/// variants = ["r1i1p1f1"]
/// native = { model_version = "1_0", experiment = "piControl" }
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawCatalog {
    #[serde(default)]
    pub variables: VariableSection,

    #[serde(default)]
    pub native: Vec<NativeGroup>,

    #[serde(default)]
    pub cmip: Vec<CmipGroup>,
}

/// Per-realm time-series variable lists plus per-experiment exclusions.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct VariableSection {
    #[serde(default)]
    pub exclude: BTreeMap<String, Vec<String>>,

    #[serde(flatten)]
    pub realms: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeGroup {
    pub project: String,
    pub model_version: String,
    pub resolution: String,
    #[serde(default)]
    pub experiments: BTreeMap<String, NativeExperiment>,
    #[serde(default)]
    pub types: Vec<DatasetType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeExperiment {
    pub start: i32,
    pub end: i32,
    pub ensembles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetType {
    pub realm: String,
    pub grid: String,
    pub data_type: String,
    pub freq: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CmipGroup {
    pub activity: String,
    pub institution: String,
    pub source: String,
    pub grid: String,
    #[serde(default)]
    pub experiments: BTreeMap<String, CmipExperiment>,
    /// Output table → variables.
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CmipExperiment {
    pub start: i32,
    pub end: i32,
    pub variants: Vec<String>,
    /// Native run this experiment was derived from.
    #[serde(default)]
    pub native: Option<NativeRef>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NativeRef {
    pub model_version: String,
    pub experiment: String,
}

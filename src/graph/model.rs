// src/graph/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Transition graph file as read from TOML.
///
/// ```toml
/// root = "WAREHOUSE"
///
/// [workflow.WAREHOUSE]
/// step = "DATASET"
/// children = ["POSTPROCESS"]
///
/// [workflow.WAREHOUSE.transitions."DATASET:Ready"]
/// default = ["POSTPROCESS:Ready"]
///
/// [workflow.WAREHOUSE.transitions."POSTPROCESS:Pass"]
/// default = ["Pass"]
///
/// [workflow.POSTPROCESS.transitions."POSTPROCESS:Ready"]
/// "atmos-native-mon" = ["ClimoGen:Ready"]
/// default = ["Pass"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawGraphFile {
    /// Name of the top namespace.
    pub root: String,

    #[serde(default)]
    pub workflow: BTreeMap<String, RawWorkflow>,
}

/// `[workflow.<NAME>]`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawWorkflow {
    /// Minor name of the workflow-level state in the parent namespace.
    /// Defaults to the workflow name.
    #[serde(default)]
    pub step: Option<String>,

    #[serde(default)]
    pub children: Vec<String>,

    /// `"STEP:VERB"` → dataset type key (or `default`) → next-state suffixes.
    #[serde(default)]
    pub transitions: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

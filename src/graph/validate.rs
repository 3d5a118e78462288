// src/graph/validate.rs

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, WarehouseError};
use crate::graph::model::{RawGraphFile, RawWorkflow};
use crate::graph::{DEFAULT_TYPE_KEY, TransitionGraph, TypeTable, Workflow};

impl TryFrom<RawGraphFile> for TransitionGraph {
    type Error = WarehouseError;

    fn try_from(raw: RawGraphFile) -> std::result::Result<Self, Self::Error> {
        ensure_root(&raw)?;
        let parents = validate_hierarchy(&raw)?;

        let mut workflows = BTreeMap::new();
        for (name, wf) in raw.workflow {
            let table = build_tables(&name, &wf)?;
            let step = wf.step.unwrap_or_else(|| name.clone());
            workflows.insert(
                name.clone(),
                Workflow {
                    parent: parents.get(&name).cloned(),
                    step,
                    children: wf.children,
                    table,
                    name,
                },
            );
        }

        Ok(TransitionGraph::new_unchecked(raw.root, workflows))
    }
}

fn config_error(msg: String) -> WarehouseError {
    WarehouseError::Configuration(msg)
}

fn ensure_root(raw: &RawGraphFile) -> Result<()> {
    if !raw.workflow.contains_key(&raw.root) {
        return Err(config_error(format!(
            "graph root '{}' has no [workflow.{}] section",
            raw.root, raw.root
        )));
    }
    Ok(())
}

/// Checks the namespace hierarchy is a tree under `root` and returns each
/// workflow's parent.
fn validate_hierarchy(raw: &RawGraphFile) -> Result<BTreeMap<String, String>> {
    let mut parents: BTreeMap<String, String> = BTreeMap::new();
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in raw.workflow.keys() {
        graph.add_node(name.as_str());
    }

    for (name, wf) in &raw.workflow {
        for child in &wf.children {
            if !raw.workflow.contains_key(child) {
                return Err(config_error(format!(
                    "workflow '{name}' lists unknown child '{child}'"
                )));
            }
            if child == &raw.root {
                return Err(config_error(format!(
                    "root workflow '{child}' cannot be a child of '{name}'"
                )));
            }
            if let Some(other) = parents.insert(child.clone(), name.clone()) {
                return Err(config_error(format!(
                    "workflow '{child}' has two parents ('{other}' and '{name}')"
                )));
            }
            graph.add_edge(name.as_str(), child.as_str(), ());
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        return Err(config_error(format!(
            "cycle in workflow hierarchy involving '{}'",
            cycle.node_id()
        )));
    }

    // Every workflow other than the root needs a parent, otherwise it is
    // unreachable.
    let orphans: BTreeSet<&str> = raw
        .workflow
        .keys()
        .filter(|n| **n != raw.root && !parents.contains_key(*n))
        .map(String::as_str)
        .collect();
    if !orphans.is_empty() {
        return Err(config_error(format!(
            "workflows not reachable from root '{}': {:?}",
            raw.root, orphans
        )));
    }

    Ok(parents)
}

fn build_tables(name: &str, wf: &RawWorkflow) -> Result<BTreeMap<String, TypeTable>> {
    let mut tables = BTreeMap::new();

    for (key, by_type) in &wf.transitions {
        if !is_segmented(key, 2) {
            return Err(config_error(format!(
                "workflow '{name}': transition key '{key}' must be STEP:VERB"
            )));
        }

        let mut table = TypeTable::default();
        for (type_key, suffixes) in by_type {
            for suffix in suffixes {
                if !is_segmented(suffix, 1) && !is_segmented(suffix, 2) {
                    return Err(config_error(format!(
                        "workflow '{name}', key '{key}': next state '{suffix}' must be VERB or STEP:VERB"
                    )));
                }
            }

            if type_key == DEFAULT_TYPE_KEY {
                table.default = Some(suffixes.clone());
            } else if type_key.split('-').count() != 3 || type_key.split('-').any(str::is_empty) {
                return Err(config_error(format!(
                    "workflow '{name}', key '{key}': dataset type '{type_key}' must be realm-grid-freq"
                )));
            } else if type_key.contains('*') {
                table.patterns.push((type_key.clone(), suffixes.clone()));
            } else {
                table.exact.insert(type_key.clone(), suffixes.clone());
            }
        }
        tables.insert(key.clone(), table);
    }

    Ok(tables)
}

fn is_segmented(s: &str, n: usize) -> bool {
    let parts: Vec<&str> = s.split(':').collect();
    parts.len() == n && parts.iter().all(|p| !p.trim().is_empty())
}

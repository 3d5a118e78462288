// src/graph/mod.rs

//! Declarative, namespaced transition graph.
//!
//! Every state is `MAJOR:MINOR:VERB` and is looked up by its last two
//! segments. A namespace `N` owns the states whose major is `N`, plus its
//! own workflow-level state `<parent(N)>:<step(N)>:*`. The root is its own
//! parent.
//!
//! Lookups are pure: the graph is loaded once and never mutated.

pub mod model;
pub mod validate;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use tracing::trace;

use crate::dataset::id::type_pattern_matches;
use crate::errors::{Result, WarehouseError};
use crate::graph::model::RawGraphFile;
use crate::status::{Params, State, Verb};

pub const DEFAULT_TYPE_KEY: &str = "default";

/// One proposed next state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: State,
    /// Namespace whose table produced the state.
    pub namespace: String,
    pub params: Params,
}

impl Transition {
    /// Engaged leaves spawn a job instead of being written.
    pub fn is_engaged(&self) -> bool {
        self.state.is_engaged()
    }
}

/// Next-state suffixes by dataset type key.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    pub(crate) exact: BTreeMap<String, Vec<String>>,
    pub(crate) patterns: Vec<(String, Vec<String>)>,
    pub(crate) default: Option<Vec<String>>,
}

impl TypeTable {
    /// Exact key, then the first matching wildcard pattern, then `default`.
    fn lookup(&self, type_key: &str) -> Option<&[String]> {
        if let Some(s) = self.exact.get(type_key) {
            return Some(s.as_slice());
        }
        if let Some((_, s)) = self
            .patterns
            .iter()
            .find(|(pattern, _)| type_pattern_matches(pattern, type_key))
        {
            return Some(s.as_slice());
        }
        self.default.as_deref()
    }

    fn suffixes(&self) -> impl Iterator<Item = &String> {
        self.exact
            .values()
            .chain(self.patterns.iter().map(|(_, s)| s))
            .chain(self.default.iter())
            .flatten()
    }
}

#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    pub step: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub(crate) table: BTreeMap<String, TypeTable>,
}

#[derive(Debug, Clone)]
pub struct TransitionGraph {
    root: String,
    workflows: BTreeMap<String, Workflow>,
}

impl TransitionGraph {
    pub(crate) fn new_unchecked(root: String, workflows: BTreeMap<String, Workflow>) -> Self {
        Self { root, workflows }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            WarehouseError::Configuration(msg) => {
                WarehouseError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let raw: RawGraphFile = toml::from_str(s)?;
        TransitionGraph::try_from(raw)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn workflow(&self, namespace: &str) -> Result<&Workflow> {
        self.workflows.get(namespace).ok_or_else(|| {
            WarehouseError::Configuration(format!("unknown workflow namespace '{namespace}'"))
        })
    }

    fn parent_name<'a>(&'a self, wf: &'a Workflow) -> &'a str {
        wf.parent.as_deref().unwrap_or(&self.root)
    }

    /// Canonical workflow-level state of `namespace`, e.g.
    /// `WAREHOUSE:POSTPROCESS:Pass`.
    pub fn workflow_state(&self, namespace: &str, verb: Verb) -> Result<State> {
        let wf = self.workflow(namespace)?;
        Ok(State::new(self.parent_name(wf), wf.step.as_str(), verb))
    }

    /// Workflow-level `Pass` or `Fail` of `namespace`.
    pub fn is_terminal(&self, namespace: &str, state: &State) -> bool {
        state.verb.is_terminal()
            && self
                .workflow_state(namespace, state.verb.clone())
                .is_ok_and(|s| s == *state)
    }

    fn belongs(&self, wf: &Workflow, state: &State) -> bool {
        state.major == wf.name
            || (state.major == self.parent_name(wf) && state.minor == wf.step)
    }

    /// Namespace under `namespace` (inclusive) whose table has an entry for
    /// `state`. `None` means the state is outside that part of the graph.
    pub fn owner<'a>(&'a self, namespace: &str, state: &State) -> Option<&'a Workflow> {
        let wf = self.workflows.get(namespace)?;
        if self.belongs(wf, state) && wf.table.contains_key(&state.key()) {
            return Some(wf);
        }
        wf.children.iter().find_map(|c| self.owner(c, state))
    }

    /// Whether `state` names a workflow under `namespace` (inclusive), by
    /// its major or as that workflow's own `<parent>:<step>` state, whether
    /// or not any table has an entry for it.
    pub fn covers(&self, namespace: &str, state: &State) -> bool {
        self.workflows.get(namespace).is_some_and(|wf| {
            self.belongs(wf, state) || wf.children.iter().any(|c| self.covers(c, state))
        })
    }

    /// `STEP:VERB` in `wf` → `wf:STEP:VERB`; `VERB` → workflow-level state.
    fn qualify(&self, wf: &Workflow, suffix: &str) -> State {
        match suffix.split_once(':') {
            Some((step, verb)) => State::new(wf.name.as_str(), step, Verb::from(verb)),
            None => State::new(self.parent_name(wf), wf.step.as_str(), Verb::from(suffix)),
        }
    }

    /// Proposed next states for a dataset of type `type_key` currently in
    /// `state`, evaluated from `namespace` downwards.
    ///
    /// A state no namespace owns, or an owned state with neither an entry for
    /// `type_key` nor a `default`, is a configuration error.
    pub fn next_states(
        &self,
        namespace: &str,
        state: &State,
        type_key: &str,
        params: &Params,
    ) -> Result<Vec<Transition>> {
        self.workflow(namespace)?;
        let wf = self.owner(namespace, state).ok_or_else(|| {
            WarehouseError::Configuration(format!(
                "no transition for state '{state}' under namespace '{namespace}'"
            ))
        })?;

        let key = state.key();
        let suffixes = wf
            .table
            .get(&key)
            .and_then(|t| t.lookup(type_key))
            .ok_or_else(|| {
                WarehouseError::Configuration(format!(
                    "workflow '{}' has no entry for dataset type '{type_key}' (or default) under '{key}'",
                    wf.name
                ))
            })?;

        let out: Vec<Transition> = suffixes
            .iter()
            .map(|s| Transition {
                state: self.qualify(wf, s),
                namespace: wf.name.clone(),
                params: params.clone(),
            })
            .collect();
        trace!(%state, %type_key, next = ?out.iter().map(|t| t.state.to_string()).collect::<Vec<_>>(), "next states");
        Ok(out)
    }

    /// Minor names of every Engaged leaf, i.e. every job kind the graph can
    /// spawn.
    pub fn engaged_steps(&self) -> BTreeSet<String> {
        self.workflows
            .values()
            .flat_map(|wf| {
                wf.table
                    .values()
                    .flat_map(|t| t.suffixes())
                    .map(move |s| self.qualify(wf, s))
            })
            .filter(State::is_engaged)
            .map(|s| s.minor)
            .collect()
    }
}

// src/catalog/mod.rs

//! Declarative catalog of the datasets a project produces.
//!
//! The catalog is a combinatorial description; [`Catalog::expand`] turns it
//! into concrete dataset ids with their year ranges and variable lists.

pub mod model;

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::catalog::model::RawCatalog;
use crate::dataset::DatasetId;
use crate::errors::{Result, WarehouseError};
use crate::jobs::CrossReference;

const TIME_SERIES: &str = "time-series";

/// One expanded catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: DatasetId,
    pub start_year: i32,
    pub end_year: i32,
    pub variables: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    raw: RawCatalog,
    entries: Vec<CatalogEntry>,
}

impl TryFrom<RawCatalog> for Catalog {
    type Error = WarehouseError;

    fn try_from(raw: RawCatalog) -> std::result::Result<Self, Self::Error> {
        let entries = expand_raw(&raw)?;
        Ok(Self { raw, entries })
    }
}

impl Catalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let raw: RawCatalog = toml::from_str(s)?;
        Catalog::try_from(raw)
    }

    /// Every dataset the catalog describes, in declaration order.
    pub fn expand(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn entry(&self, id: &DatasetId) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }
}

impl CrossReference for Catalog {
    fn native_for(&self, source: &str, experiment: &str) -> Option<(String, String)> {
        self.raw
            .cmip
            .iter()
            .filter(|g| g.source == source)
            .find_map(|g| g.experiments.get(experiment)?.native.as_ref())
            .map(|n| (n.model_version.clone(), n.experiment.clone()))
    }
}

fn config_error(msg: String) -> WarehouseError {
    WarehouseError::Configuration(format!("catalog: {msg}"))
}

fn check_years(what: &str, start: i32, end: i32) -> Result<()> {
    if start > end {
        return Err(config_error(format!("{what}: start {start} is after end {end}")));
    }
    Ok(())
}

/// Realm variables minus the experiment's exclusions.
fn time_series_variables(raw: &RawCatalog, realm: &str, experiment: &str) -> Vec<String> {
    let excluded = raw.variables.exclude.get(experiment);
    raw.variables
        .realms
        .get(realm)
        .map(|vars| {
            vars.iter()
                .filter(|v| !excluded.is_some_and(|ex| ex.contains(v)))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn expand_raw(raw: &RawCatalog) -> Result<Vec<CatalogEntry>> {
    let mut entries = Vec::new();

    for group in &raw.native {
        for (experiment, exp) in &group.experiments {
            check_years(experiment, exp.start, exp.end)?;
            for ensemble in &exp.ensembles {
                for ty in &group.types {
                    let id = format!(
                        "{}.{}.{}.{}.{}.{}.{}.{}.{}",
                        group.project,
                        group.model_version,
                        experiment,
                        group.resolution,
                        ty.realm,
                        ty.grid,
                        ty.data_type,
                        ty.freq,
                        ensemble
                    );
                    let variables = if ty.data_type == TIME_SERIES {
                        time_series_variables(raw, &ty.realm, experiment)
                    } else {
                        Vec::new()
                    };
                    entries.push(CatalogEntry {
                        id: parse_id(&id)?,
                        start_year: exp.start,
                        end_year: exp.end,
                        variables,
                    });
                }
            }
        }
    }

    for group in &raw.cmip {
        for (experiment, exp) in &group.experiments {
            check_years(experiment, exp.start, exp.end)?;
            for variant in &exp.variants {
                for (table, variables) in &group.tables {
                    for variable in variables {
                        let id = format!(
                            "CMIP6.{}.{}.{}.{}.{}.{}.{}.{}",
                            group.activity,
                            group.institution,
                            group.source,
                            experiment,
                            variant,
                            table,
                            variable,
                            group.grid
                        );
                        entries.push(CatalogEntry {
                            id: parse_id(&id)?,
                            start_year: exp.start,
                            end_year: exp.end,
                            variables: vec![variable.clone()],
                        });
                    }
                }
            }
        }
    }

    debug!(count = entries.len(), "expanded catalog");
    Ok(entries)
}

fn parse_id(raw: &str) -> Result<DatasetId> {
    DatasetId::parse(raw).map_err(|e| config_error(e.to_string()))
}

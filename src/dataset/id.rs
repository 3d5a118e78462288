// src/dataset/id.rs

//! Dataset identifiers and their facet decomposition.
//!
//! Two dot-joined encodings share one namespace:
//!
//! - native:  `project.model_version.experiment.resolution.realm.grid.data_type.freq.ensemble`
//!   e.g. `E3SM.1_0.historical.1deg_atm_60-30km_ocean.atmos.native.model-output.mon.ens1`
//! - derived: `project.activity.institution.source.experiment.variant.table.variable.grid`
//!   e.g. `CMIP6.CMIP.E3SM-Project.E3SM-1-0.historical.r1i1p1f1.Amon.tas.gr`
//!
//! Both parse into the same canonical [`Facets`].

use std::fmt;
use std::str::FromStr;

use crate::dataset::companion::table_realm_freq;
use crate::errors::{Result, WarehouseError};

/// Project name that selects the derived encoding.
pub const DERIVED_PROJECT: &str = "CMIP6";

/// Data type recorded for derived datasets.
pub const DERIVED_DATA_TYPE: &str = "CMIP";

const FACET_COUNT: usize = 9;

/// Canonical attribute set shared by both encodings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Facets {
    pub project: String,
    pub model_version: String,
    pub experiment: String,
    pub ensemble: String,
    pub realm: String,
    pub grid: String,
    pub data_type: String,
    pub freq: String,
}

/// Facets that only exist in one of the two encodings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Encoding {
    Native {
        resolution: String,
    },
    Derived {
        activity: String,
        institution: String,
        table: String,
        variable: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId {
    raw: String,
    facets: Facets,
    encoding: Encoding,
}

impl DatasetId {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() != FACET_COUNT || parts.iter().any(|p| p.is_empty()) {
            return Err(malformed(raw, "expected 9 dot-separated facets"));
        }

        if parts[0] == DERIVED_PROJECT {
            let table = parts[6];
            let (realm, freq) = table_realm_freq(table)
                .ok_or_else(|| malformed(raw, &format!("unknown table '{table}'")))?;
            Ok(DatasetId {
                raw: raw.to_string(),
                facets: Facets {
                    project: parts[0].to_string(),
                    model_version: parts[3].to_string(),
                    experiment: parts[4].to_string(),
                    ensemble: parts[5].to_string(),
                    realm: realm.to_string(),
                    grid: parts[8].to_string(),
                    data_type: DERIVED_DATA_TYPE.to_string(),
                    freq: freq.to_string(),
                },
                encoding: Encoding::Derived {
                    activity: parts[1].to_string(),
                    institution: parts[2].to_string(),
                    table: table.to_string(),
                    variable: parts[7].to_string(),
                },
            })
        } else {
            Ok(DatasetId {
                raw: raw.to_string(),
                facets: Facets {
                    project: parts[0].to_string(),
                    model_version: parts[1].to_string(),
                    experiment: parts[2].to_string(),
                    realm: parts[4].to_string(),
                    grid: parts[5].to_string(),
                    data_type: parts[6].to_string(),
                    freq: parts[7].to_string(),
                    ensemble: parts[8].to_string(),
                },
                encoding: Encoding::Native {
                    resolution: parts[3].to_string(),
                },
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn facets(&self) -> &Facets {
        &self.facets
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.encoding, Encoding::Derived { .. })
    }

    pub fn table(&self) -> Option<&str> {
        match &self.encoding {
            Encoding::Derived { table, .. } => Some(table),
            Encoding::Native { .. } => None,
        }
    }

    pub fn variable(&self) -> Option<&str> {
        match &self.encoding {
            Encoding::Derived { variable, .. } => Some(variable),
            Encoding::Native { .. } => None,
        }
    }

    /// `realm-grid-freq`, each segment with its own hyphens removed.
    pub fn type_key(&self) -> String {
        format!(
            "{}-{}-{}",
            strip_hyphens(&self.facets.realm),
            strip_hyphens(&self.facets.grid),
            strip_hyphens(&self.facets.freq)
        )
    }

    /// Climatology and time-series products are computed from a native
    /// model-output dataset.
    pub fn is_postprocessed_type(&self) -> bool {
        matches!(self.facets.data_type.as_str(), "climo" | "time-series")
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DatasetId {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self> {
        DatasetId::parse(s)
    }
}

fn malformed(raw: &str, why: &str) -> WarehouseError {
    WarehouseError::Configuration(format!("malformed dataset id '{raw}': {why}"))
}

pub fn strip_hyphens(s: &str) -> String {
    s.replace('-', "")
}

/// Segment-wise match of a `realm-grid-freq` pattern; `*` matches anything.
pub fn type_pattern_matches(pattern: &str, type_key: &str) -> bool {
    let pat: Vec<&str> = pattern.split('-').collect();
    let key: Vec<&str> = type_key.split('-').collect();
    pat.len() == key.len() && pat.iter().zip(&key).all(|(p, k)| *p == "*" || p == k)
}

/// `E3SM-1-0`, `1-0` and `1_0` all normalize to `1_0`.
pub fn normalize_model_version(version: &str) -> String {
    version
        .strip_prefix("E3SM-")
        .unwrap_or(version)
        .replace('-', "_")
}

/// Realization index of `ensN` or `rNi..p..f..`.
pub fn ensemble_index(ensemble: &str) -> Option<u32> {
    if let Some(rest) = ensemble.strip_prefix("ens") {
        return rest.parse().ok();
    }
    let rest = ensemble.strip_prefix('r')?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || !rest[digits.len()..].starts_with('i') {
        return None;
    }
    digits.parse().ok()
}

/// Ensembles are equal when their realization indices are; strings that
/// carry no index must match verbatim.
pub fn ensembles_match(a: &str, b: &str) -> bool {
    match (ensemble_index(a), ensemble_index(b)) {
        (Some(x), Some(y)) => x == y,
        (None, None) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_and_derived_share_canonical_facets() {
        let native = DatasetId::parse(
            "E3SM.1_0.historical.1deg_atm_60-30km_ocean.sea-ice.native.model-output.mon.ens2",
        )
        .unwrap();
        assert_eq!(native.facets().realm, "sea-ice");
        assert_eq!(native.type_key(), "seaice-native-mon");
        assert!(!native.is_derived());

        let derived =
            DatasetId::parse("CMIP6.CMIP.E3SM-Project.E3SM-1-0.historical.r2i1p1f1.SImon.siconc.gr")
                .unwrap();
        assert_eq!(derived.facets().realm, "sea-ice");
        assert_eq!(derived.facets().freq, "mon");
        assert_eq!(derived.type_key(), "seaice-gr-mon");
        assert_eq!(derived.variable(), Some("siconc"));
    }

    #[test]
    fn unknown_table_is_rejected() {
        assert!(DatasetId::parse("CMIP6.CMIP.E3SM-Project.E3SM-1-0.historical.r1i1p1f1.Xmon.tas.gr").is_err());
        assert!(DatasetId::parse("E3SM.1_0.historical").is_err());
    }

    #[test]
    fn normalizations() {
        assert_eq!(normalize_model_version("E3SM-1-0"), "1_0");
        assert_eq!(normalize_model_version("1_0"), "1_0");
        assert_eq!(normalize_model_version("E3SM-1-1-ECA"), "1_1_ECA");
        assert!(ensembles_match("ens3", "r3i1p1f1"));
        assert!(!ensembles_match("ens3", "r30i1p1f1"));
        assert!(!ensembles_match("ens3", "member3"));
        assert!(ensembles_match("member3", "member3"));
        assert!(type_pattern_matches("*-native-mon", "seaice-native-mon"));
        assert!(!type_pattern_matches("*-native-mon", "seaice-native-day"));
    }
}

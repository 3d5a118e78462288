// src/jobs/kind.rs

//! Closed set of job kinds, registered by name.

use std::fmt;

use crate::dataset::id::{DatasetId, strip_hyphens};

/// Every kind of batch job the graph can spawn.
///
/// The graph names a kind by the minor segment of an Engaged leaf, e.g.
/// `POSTPROCESS:ClimoGen:Engaged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobKind {
    Extract,
    Validate,
    ClimoGen,
    TimeseriesGen,
    MpasAnalysis,
    CmorConvert,
    Publish,
    Cleanup,
}

const REGISTRY: &[(&str, JobKind)] = &[
    ("Extract", JobKind::Extract),
    ("Validate", JobKind::Validate),
    ("ClimoGen", JobKind::ClimoGen),
    ("TimeseriesGen", JobKind::TimeseriesGen),
    ("MpasAnalysis", JobKind::MpasAnalysis),
    ("CmorConvert", JobKind::CmorConvert),
    ("Publish", JobKind::Publish),
    ("Cleanup", JobKind::Cleanup),
];

/// Slot key satisfied by the target dataset itself.
const ANY: &str = "*-*-*";

impl JobKind {
    pub fn from_name(name: &str) -> Option<JobKind> {
        REGISTRY
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, kind)| *kind)
    }

    pub fn name(&self) -> &'static str {
        REGISTRY
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(n, _)| *n)
            .unwrap_or("Unknown")
    }

    pub fn all() -> impl Iterator<Item = JobKind> {
        REGISTRY.iter().map(|(_, kind)| *kind)
    }

    /// Ordered requirement keys (`realm-grid-freq` patterns) for a job
    /// targeting `target`.
    pub fn requirements(&self, target: &DatasetId) -> Vec<String> {
        match self {
            JobKind::Extract | JobKind::Validate | JobKind::Publish | JobKind::Cleanup => {
                vec![ANY.to_string()]
            }
            JobKind::ClimoGen => vec!["*-native-mon".to_string()],
            JobKind::TimeseriesGen => vec!["*-native-*".to_string()],
            JobKind::MpasAnalysis => ocean_seaice_pair(),
            JobKind::CmorConvert => {
                let f = target.facets();
                if matches!(f.realm.as_str(), "ocean" | "sea-ice") {
                    ocean_seaice_pair()
                } else {
                    let freq = if f.freq == "fixed" { "mon" } else { f.freq.as_str() };
                    vec![format!(
                        "{}-native-{}",
                        strip_hyphens(&f.realm),
                        strip_hyphens(freq)
                    )]
                }
            }
        }
    }

    /// Whether the job reads from the target's companion native dataset
    /// rather than the target itself.
    pub fn uses_companion(&self, target: &DatasetId) -> bool {
        match self {
            JobKind::CmorConvert => true,
            JobKind::ClimoGen | JobKind::TimeseriesGen | JobKind::MpasAnalysis => {
                target.is_derived() || target.is_postprocessed_type()
            }
            _ => false,
        }
    }
}

fn ocean_seaice_pair() -> Vec<String> {
    vec!["ocean-native-mon".to_string(), "seaice-native-mon".to_string()]
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trips_every_kind() {
        for kind in JobKind::all() {
            assert_eq!(JobKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(JobKind::from_name("Regrid"), None);
    }

    #[test]
    fn cmor_requirements_follow_the_target() {
        let amon = DatasetId::parse("CMIP6.CMIP.E3SM-Project.E3SM-1-0.historical.r1i1p1f1.Amon.tas.gr")
            .unwrap();
        assert_eq!(JobKind::CmorConvert.requirements(&amon), vec!["atmos-native-mon"]);

        let omon = DatasetId::parse("CMIP6.CMIP.E3SM-Project.E3SM-1-0.historical.r1i1p1f1.Omon.tos.gr")
            .unwrap();
        assert_eq!(
            JobKind::CmorConvert.requirements(&omon),
            vec!["ocean-native-mon", "seaice-native-mon"]
        );
    }
}

// src/jobs/requirements.rs

//! Matching candidate datasets against a job's requirement slots.
//!
//! A candidate fills a slot only if all of these hold:
//!
//! 1. Experiment rule. Native targets need the same experiment. Derived
//!    targets need the candidate's `(model version, experiment)` to equal
//!    the native pair the catalog declares for the target's experiment.
//! 2. Model versions normalize equal (`1_0` == `E3SM-1-0`).
//! 3. Ensembles normalize equal (`ens3` == `r3i1p1f1`).
//! 4. The candidate's `realm-grid-freq` matches the slot pattern.
//!
//! Only the first unfilled slot that matches is returned.

use tracing::trace;

use crate::dataset::companion::remap_experiment;
use crate::dataset::id::{
    DatasetId, ensembles_match, normalize_model_version, type_pattern_matches,
};
use crate::jobs::WorkflowJob;

/// Catalog lookup of the native `(model version, experiment)` a derived
/// `(source, experiment)` pair was produced from.
pub trait CrossReference {
    fn native_for(&self, source: &str, experiment: &str) -> Option<(String, String)>;
}

/// Falls back to the built-in experiment remap table.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCrossReference;

impl CrossReference for BuiltinCrossReference {
    fn native_for(&self, _source: &str, _experiment: &str) -> Option<(String, String)> {
        None
    }
}

/// `(normalized model version, experiment)` a candidate must carry to feed
/// a job targeting `target`.
fn expected_pair(target: &DatasetId, candidate: &DatasetId, xref: &dyn CrossReference) -> (String, String) {
    let f = target.facets();
    if target.is_derived() && !candidate.is_derived() {
        let (model, experiment) = xref
            .native_for(&f.model_version, &f.experiment)
            .unwrap_or_else(|| {
                (
                    f.model_version.clone(),
                    remap_experiment(&f.model_version, &f.experiment),
                )
            });
        (normalize_model_version(&model), experiment)
    } else {
        (normalize_model_version(&f.model_version), f.experiment.clone())
    }
}

/// Everything but the slot pattern: experiment, model version, ensemble.
pub fn same_lineage(target: &DatasetId, candidate: &DatasetId, xref: &dyn CrossReference) -> bool {
    let (model, experiment) = expected_pair(target, candidate, xref);
    let c = candidate.facets();
    c.experiment == experiment
        && normalize_model_version(&c.model_version) == model
        && ensembles_match(&target.facets().ensemble, &c.ensemble)
}

/// Key of the first unfilled slot of `job` that `candidate` satisfies.
pub fn matches_requirement(
    job: &WorkflowJob,
    candidate: &DatasetId,
    xref: &dyn CrossReference,
) -> Option<String> {
    if job.holds(candidate) || !same_lineage(&job.target, candidate, xref) {
        return None;
    }
    let type_key = candidate.type_key();
    let key = job
        .requirements
        .iter()
        .filter(|slot| slot.dataset.is_none())
        .find(|slot| type_pattern_matches(&slot.key, &type_key))
        .map(|slot| slot.key.clone());
    trace!(job = %job.kind, candidate = %candidate, slot = ?key, "requirement match");
    key
}

/// True iff every slot is filled.
pub fn meets_requirements(job: &WorkflowJob) -> bool {
    job.requirements.iter().all(|slot| slot.dataset.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobKind;

    fn id(s: &str) -> DatasetId {
        DatasetId::parse(s).unwrap()
    }

    #[test]
    fn derived_target_uses_builtin_remap() {
        let target = id("CMIP6.CMIP.E3SM-Project.E3SM-1-1.hist-bgc.r1i1p1f1.Lmon.gpp.gr");
        let job = WorkflowJob::new(JobKind::CmorConvert, "CMOR", target);

        let remapped = id("E3SM.1_1.hist-BCRC.1deg_atm_60-30km_ocean.land.native.model-output.mon.ens1");
        let literal = id("E3SM.1_1.hist-bgc.1deg_atm_60-30km_ocean.land.native.model-output.mon.ens1");
        assert_eq!(
            matches_requirement(&job, &remapped, &BuiltinCrossReference),
            Some("land-native-mon".to_string())
        );
        assert_eq!(matches_requirement(&job, &literal, &BuiltinCrossReference), None);
    }

    #[test]
    fn first_unfilled_slot_wins() {
        let target = id("E3SM.1_0.piControl.LR.ocean.native.model-output.mon.ens1");
        let mut job = WorkflowJob::new(JobKind::MpasAnalysis, "POSTPROCESS", target.clone());
        job.fill("ocean-native-mon", target);
        assert!(!meets_requirements(&job));

        let other_ocean = id("E3SM.1_0.piControl.LR.ocean.native.model-output.mon.r1i1p1f1");
        assert_eq!(matches_requirement(&job, &other_ocean, &BuiltinCrossReference), None);

        let seaice = id("E3SM.1_0.piControl.LR.sea-ice.native.model-output.mon.ens1");
        assert_eq!(
            matches_requirement(&job, &seaice, &BuiltinCrossReference),
            Some("seaice-native-mon".to_string())
        );
        job.fill("seaice-native-mon", seaice);
        assert!(meets_requirements(&job));
    }
}

// tests/job_resolution.rs

use warehouse::dataset::companion_native_id;
use warehouse::engine::RuntimeEvent;
use warehouse::jobs::{BuiltinCrossReference, JobKind, JobPool, WorkflowJob, matches_requirement};
use warehouse_test_utils::builders::{ATMOS_ID, TestWorld, id};

const DERIVED_GRAPH: &str = r#"
root = "WAREHOUSE"

[workflow.WAREHOUSE]
step = "DATASET"
children = ["POSTPROCESS"]

[workflow.POSTPROCESS.transitions."POSTPROCESS:Ready"]
"atmos-180x360-mon" = ["ClimoGen:Engaged"]
"atmos-gr-mon" = ["CmorConvert:Engaged"]
default = ["Pass"]

[workflow.POSTPROCESS.transitions."ClimoGen:Pass"]
default = ["Pass"]

[workflow.POSTPROCESS.transitions."ClimoGen:Fail"]
default = ["Fail"]

[workflow.POSTPROCESS.transitions."CmorConvert:Pass"]
default = ["Pass"]

[workflow.POSTPROCESS.transitions."CmorConvert:Fail"]
default = ["Fail"]
"#;

const CLIMO_CATALOG: &str = r#"
[[native]]
project = "E3SM"
model_version = "1_0"
resolution = "LR"
types = [{ realm = "atmos", grid = "180x360", data_type = "climo", freq = "mon" }]

[native.experiments.piControl]
start = 1
end = 50
ensembles = ["ens1"]
"#;

const CLIMO_ID: &str = "E3SM.1_0.piControl.LR.atmos.180x360.climo.mon.ens1";

const CMIP_CATALOG: &str = r#"
[[cmip]]
activity = "CMIP"
institution = "E3SM-Project"
source = "E3SM-1-1"
grid = "gr"
tables = { Amon = ["tas"] }

[cmip.experiments.hist-bgc]
start = 1850
end = 2014
variants = ["r1i1p1f1"]
"#;

const CMIP_ID: &str = "CMIP6.CMIP.E3SM-Project.E3SM-1-1.hist-bgc.r1i1p1f1.Amon.tas.gr";
const CMIP_NATIVE_ID: &str =
    "E3SM.1_1.hist-BCRC.1deg_atm_60-30km_ocean.atmos.native.model-output.mon.ens1";

#[test]
fn climo_reads_from_a_staged_companion_it_does_not_track() {
    let world = TestWorld::new();
    world.stage(ATMOS_ID, "v1");
    let mut core = world.core_with("POSTPROCESS", DERIVED_GRAPH, CLIMO_CATALOG);
    assert_eq!(core.datasets().count(), 1);

    let step = core.step(RuntimeEvent::Sweep).unwrap();
    let tickets: Vec<_> = step.submissions().collect();
    assert_eq!(tickets.len(), 1);
    assert!(
        tickets[0]
            .script
            .body
            .contains(&format!("ncclimo -s 1 -e 50 -i {ATMOS_ID}"))
    );

    let (_, job) = core.pool().iter().next().unwrap();
    assert_eq!(job.participants, vec![id(CLIMO_ID)]);
    // The companion is read, not written: only the target is locked.
    assert!(world.is_locked(CLIMO_ID));
    assert!(!world.is_locked(ATMOS_ID));
}

#[test]
fn unresolvable_companion_fails_the_step_after_max_attempts() {
    let world = TestWorld::with(|b| b.max_attempts(2));
    let mut core = world.core_with("POSTPROCESS", DERIVED_GRAPH, CLIMO_CATALOG);

    let first = core.step(RuntimeEvent::Sweep).unwrap();
    assert!(first.submissions().next().is_none());
    assert!(first.keep_running);
    assert_eq!(
        world.current_state(CLIMO_ID).as_deref(),
        Some("WAREHOUSE:POSTPROCESS:Ready")
    );

    let second = core.step(RuntimeEvent::Sweep).unwrap();
    assert!(!second.keep_running);
    let fail = world
        .events(CLIMO_ID)
        .into_iter()
        .find(|e| e.state.to_string() == "POSTPROCESS:ClimoGen:Fail")
        .unwrap();
    assert!(fail.message.unwrap().contains(ATMOS_ID));
    assert_eq!(
        world.current_state(CLIMO_ID).as_deref(),
        Some("WAREHOUSE:POSTPROCESS:Fail")
    );
    assert!(core.pool().is_empty());
}

#[test]
fn cmip_target_resolves_through_the_experiment_remap() {
    let world = TestWorld::with(|b| b.job("CmorConvert", "cmor -v {variables} -i {input:atmos-native-mon}"));
    world.stage(CMIP_NATIVE_ID, "v3");
    let mut core = world.core_with("POSTPROCESS", DERIVED_GRAPH, CMIP_CATALOG);

    let step = core.step(RuntimeEvent::Sweep).unwrap();
    let ticket = step.submissions().next().unwrap();
    assert_eq!(ticket.script.name, format!("CmorConvert-{CMIP_ID}"));
    assert!(ticket.script.body.contains(&format!("cmor -v tas -i {CMIP_NATIVE_ID}")));
}

const DECLARED_CATALOG: &str = r#"
[[cmip]]
activity = "CMIP"
institution = "E3SM-Project"
source = "E3SM-1-0"
grid = "gr"
tables = { Amon = ["pr"] }

[cmip.experiments.amip]
start = 1870
end = 2014
variants = ["r1i1p1f1"]
native = { model_version = "1_0", experiment = "F2010" }
"#;

const DECLARED_CMIP_ID: &str = "CMIP6.CMIP.E3SM-Project.E3SM-1-0.amip.r1i1p1f1.Amon.pr.gr";
const DECLARED_NATIVE_ID: &str =
    "E3SM.1_0.F2010.1deg_atm_60-30km_ocean.atmos.native.model-output.mon.ens1";

#[test]
fn catalog_declared_native_run_feeds_the_cmip_job() {
    let world = TestWorld::with(|b| b.job("CmorConvert", "cmor -v {variables} -i {input:atmos-native-mon}"));
    world.stage(DECLARED_NATIVE_ID, "v1");
    let mut core = world.core_with("POSTPROCESS", DERIVED_GRAPH, DECLARED_CATALOG);

    let step = core.step(RuntimeEvent::Sweep).unwrap();
    let ticket = step.submissions().next().unwrap();
    assert_eq!(ticket.script.name, format!("CmorConvert-{DECLARED_CMIP_ID}"));
    assert!(
        ticket
            .script
            .body
            .contains(&format!("cmor -v pr -i {DECLARED_NATIVE_ID}"))
    );
    // The built-in table alone would have looked for an "amip" run.
    assert_ne!(companion_native_id(&id(DECLARED_CMIP_ID)), Some(id(DECLARED_NATIVE_ID)));
}

#[test]
fn companion_mapping_is_pure() {
    let cmip = id(CMIP_ID);
    assert_eq!(companion_native_id(&cmip), Some(id(CMIP_NATIVE_ID)));
    assert_eq!(companion_native_id(&cmip), companion_native_id(&cmip));
    assert_eq!(companion_native_id(&id(CLIMO_ID)), Some(id(ATMOS_ID)));
    assert_eq!(companion_native_id(&id(ATMOS_ID)), None);
}

#[test]
fn pool_merges_complementary_halves_only() {
    let xref = BuiltinCrossReference;
    let ocean = id("E3SM.1_0.piControl.LR.ocean.native.model-output.mon.ens1");
    let seaice = id("E3SM.1_0.piControl.LR.sea-ice.native.model-output.mon.ens1");
    let other_member = id("E3SM.1_0.piControl.LR.sea-ice.native.model-output.mon.ens2");

    let mut pool = JobPool::new();
    let mut first = WorkflowJob::new(JobKind::MpasAnalysis, "POSTPROCESS", ocean.clone());
    let slot = matches_requirement(&first, &ocean, &xref).unwrap();
    first.fill(&slot, ocean.clone());
    let key = pool.insert(first);

    let stranger = WorkflowJob::new(JobKind::MpasAnalysis, "POSTPROCESS", other_member);
    assert!(pool.find_matching_job(&stranger, &xref).is_none());

    let partner = WorkflowJob::new(JobKind::MpasAnalysis, "POSTPROCESS", seaice.clone());
    assert_eq!(pool.find_matching_job(&partner, &xref), Some(key));
    assert!(pool.merge_into(key, partner, &xref));

    let merged = pool.get(key).unwrap();
    assert!(merged.is_ready());
    assert_eq!(merged.participants, vec![ocean, seaice.clone()]);
    assert_eq!(merged.input("seaice-native-mon"), Some(&seaice));
    assert_eq!(pool.len(), 1);
}

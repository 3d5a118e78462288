// tests/transition_graph.rs

use proptest::prelude::*;
use warehouse::errors::WarehouseError;
use warehouse::graph::TransitionGraph;
use warehouse::status::{Params, State, Verb};
use warehouse_test_utils::builders::POSTPROCESS_GRAPH;

fn graph() -> TransitionGraph {
    TransitionGraph::from_toml_str(POSTPROCESS_GRAPH).unwrap()
}

fn state(s: &str) -> State {
    s.parse().unwrap()
}

#[test]
fn ownership_follows_the_namespace_tree() {
    let g = graph();
    let ready = state("WAREHOUSE:POSTPROCESS:Ready");
    assert_eq!(g.owner("POSTPROCESS", &ready).unwrap().name, "POSTPROCESS");
    assert_eq!(g.owner("WAREHOUSE", &ready).unwrap().name, "POSTPROCESS");
    assert_eq!(
        g.owner("WAREHOUSE", &state("WAREHOUSE:DATASET:Ready")).unwrap().name,
        "WAREHOUSE"
    );
    assert!(g.owner("POSTPROCESS", &state("WAREHOUSE:DATASET:Ready")).is_none());
    assert!(g.owner("POSTPROCESS", &state("EXTRACTION:Extract:Pass")).is_none());
}

#[test]
fn coverage_includes_states_no_table_mentions() {
    let g = graph();
    let unlisted = state("POSTPROCESS:ClimoGen:Returned");
    assert!(g.owner("POSTPROCESS", &unlisted).is_none());
    assert!(g.covers("POSTPROCESS", &unlisted));
    assert!(g.covers("WAREHOUSE", &unlisted));
    assert!(g.covers("POSTPROCESS", &state("WAREHOUSE:POSTPROCESS:Returned")));
    assert!(!g.covers("POSTPROCESS", &state("WAREHOUSE:DATASET:Pass")));
    assert!(!g.covers("POSTPROCESS", &state("EXTRACTION:Extract:Pass")));
}

#[test]
fn terminal_states_are_workflow_level() {
    let g = graph();
    assert!(g.is_terminal("POSTPROCESS", &state("WAREHOUSE:POSTPROCESS:Pass")));
    assert!(g.is_terminal("POSTPROCESS", &state("WAREHOUSE:POSTPROCESS:Fail")));
    assert!(!g.is_terminal("POSTPROCESS", &state("POSTPROCESS:ClimoGen:Pass")));
    assert!(!g.is_terminal("WAREHOUSE", &state("WAREHOUSE:POSTPROCESS:Pass")));
    assert!(g.is_terminal("WAREHOUSE", &state("WAREHOUSE:DATASET:Pass")));
}

#[test]
fn engaged_leaves_name_registered_jobs() {
    let steps: Vec<String> = graph().engaged_steps().into_iter().collect();
    assert_eq!(steps, vec!["ClimoGen", "MpasAnalysis"]);
}

#[test]
fn missing_type_entry_without_default_is_a_configuration_error() {
    let g = TransitionGraph::from_toml_str(
        r#"
root = "WAREHOUSE"

[workflow.WAREHOUSE]
step = "DATASET"

[workflow.WAREHOUSE.transitions."DATASET:Ready"]
"atmos-native-mon" = ["Pass"]
"#,
    )
    .unwrap();

    let err = g
        .next_states(
            "WAREHOUSE",
            &state("WAREHOUSE:DATASET:Ready"),
            "ocean-native-mon",
            &Params::new(),
        )
        .unwrap_err();
    match err {
        WarehouseError::Configuration(msg) => assert!(msg.contains("ocean-native-mon")),
        other => panic!("expected Configuration error, got {other:?}"),
    }
}

#[test]
fn unknown_namespace_is_rejected() {
    assert!(matches!(
        graph().workflow("PUBLICATION"),
        Err(WarehouseError::Configuration(_))
    ));
}

#[test]
fn params_ride_along_with_every_proposal() {
    let g = graph();
    let params = Params::new().with("job_id", "12");
    let next = g
        .next_states(
            "POSTPROCESS",
            &state("POSTPROCESS:ClimoGen:Pass"),
            "atmos-native-mon",
            &params,
        )
        .unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].state, State::new("WAREHOUSE", "POSTPROCESS", Verb::Pass));
    assert_eq!(next[0].params.get("job_id"), Some("12"));
}

fn type_key() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("atmos"), Just("ocean"), Just("seaice"), Just("land")],
        prop_oneof![Just("native"), Just("180x360"), Just("gr")],
        prop_oneof![Just("mon"), Just("day"), Just("3hr")],
    )
        .prop_map(|(r, g, f)| format!("{r}-{g}-{f}"))
}

proptest! {
    /// Lookups are pure: asking twice gives the same answer, and the graph
    /// never proposes anything for an unowned state.
    #[test]
    fn lookups_are_pure(key in type_key()) {
        let g = graph();
        let ready = state("WAREHOUSE:POSTPROCESS:Ready");
        let first = g.next_states("POSTPROCESS", &ready, &key, &Params::new()).unwrap();
        let second = g.next_states("POSTPROCESS", &ready, &key, &Params::new()).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.len(), 1);

        let expected = match key.as_str() {
            "atmos-native-mon" => "POSTPROCESS:ClimoGen:Engaged",
            "ocean-native-mon" | "seaice-native-mon" => "POSTPROCESS:MpasAnalysis:Engaged",
            _ => "WAREHOUSE:POSTPROCESS:Pass",
        };
        prop_assert_eq!(first[0].state.to_string(), expected);

        let outside = state("EXTRACTION:Extract:Pass");
        prop_assert!(g.next_states("POSTPROCESS", &outside, &key, &Params::new()).is_err());
    }
}

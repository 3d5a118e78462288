// tests/demo_configs.rs
//
// The shipped demo configuration must load as-is.

use std::path::PathBuf;

use warehouse::catalog::Catalog;
use warehouse::config::{Overrides, load_settings};
use warehouse::graph::TransitionGraph;
use warehouse::jobs::JobKind;
use warehouse::types::BackendKind;

fn demos() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos")
}

#[test]
fn demo_settings_anchor_relative_paths() {
    let settings = load_settings(demos().join("warehouse.toml"), true, &Overrides::default()).unwrap();
    assert_eq!(settings.catalog, demos().join("catalog.toml"));
    assert_eq!(settings.graph, demos().join("graph.toml"));
    assert_eq!(settings.scheduler.backend, BackendKind::Local);
    assert_eq!(settings.run.max_attempts, 2);
    assert!(settings.command_template(JobKind::MpasAnalysis).is_some());
}

#[test]
fn demo_graph_only_spawns_configured_jobs() {
    let settings = load_settings(demos().join("warehouse.toml"), true, &Overrides::default()).unwrap();
    let graph = TransitionGraph::load(&settings.graph).unwrap();
    for step in graph.engaged_steps() {
        let kind = JobKind::from_name(&step).unwrap();
        assert!(
            settings.command_template(kind).is_some(),
            "no command template for {step}"
        );
    }
    for ns in ["EXTRACTION", "VALIDATION", "POSTPROCESS", "PUBLICATION", "CLEANUP"] {
        assert!(graph.workflow(ns).is_ok(), "{ns}");
    }
}

#[test]
fn demo_catalog_expands() {
    let catalog = Catalog::load(demos().join("catalog.toml")).unwrap();
    // Four native types and two CMIP variables for one ensemble member.
    assert_eq!(catalog.expand().len(), 6);
}

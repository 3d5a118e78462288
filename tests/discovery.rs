// tests/discovery.rs

use std::path::Path;

use warehouse::dataset::storage::{facet_path, latest_version_dir};
use warehouse::engine::{initialize, preview};
use warehouse::fs::mock::MockFileSystem;
use warehouse::index::{ListIndex, NoIndex};
use warehouse::status::status_path;
use warehouse_test_utils::builders::{
    ATMOS_ID, NATIVE_CATALOG, OCEAN_ID, POSTPROCESS_GRAPH, SEAICE_ID, TestWorld, id,
};

fn version_file(fs: &MockFileSystem, root: &Path, raw: &str, version: &str) {
    fs.add_file(root.join(facet_path(&id(raw))).join(version).join("data.nc"), "x");
}

#[test]
fn initial_markers_follow_index_then_publication_then_staging() {
    let world = TestWorld::new();
    let roots = &world.settings.roots;
    let fs = MockFileSystem::new();
    version_file(&fs, &roots.publication, OCEAN_ID, "v1");
    version_file(&fs, &roots.staging, SEAICE_ID, "v2");
    let index = ListIndex::parse(&format!("# published upstream\n{ATMOS_ID}\n"));

    let graph = world.graph(POSTPROCESS_GRAPH);
    let catalog = world.catalog(NATIVE_CATALOG);
    let datasets = initialize(&world.settings, &graph, &catalog, &index, &fs).unwrap();

    let ids: Vec<&str> = datasets.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec![ATMOS_ID, OCEAN_ID, SEAICE_ID]);
    assert_eq!(
        world.current_state(ATMOS_ID).as_deref(),
        Some("WAREHOUSE:DATASET:Published")
    );
    assert_eq!(
        world.current_state(OCEAN_ID).as_deref(),
        Some("WAREHOUSE:DATASET:Published")
    );
    assert_eq!(
        world.current_state(SEAICE_ID).as_deref(),
        Some("WAREHOUSE:DATASET:Unpublished")
    );

    let seaice = datasets.iter().find(|d| d.id.as_str() == SEAICE_ID).unwrap();
    assert_eq!(
        seaice.locations.staging.as_deref(),
        Some(roots.staging.join(facet_path(&id(SEAICE_ID))).join("v2").as_path())
    );
    assert!(seaice.locations.publication.is_none());
}

#[test]
fn empty_version_directories_do_not_count() {
    let world = TestWorld::new();
    let roots = &world.settings.roots;
    let fs = MockFileSystem::new();
    fs.add_dir(roots.staging.join(facet_path(&id(ATMOS_ID))).join("v1"));

    let graph = world.graph(POSTPROCESS_GRAPH);
    let catalog = world.catalog(NATIVE_CATALOG);
    initialize(&world.settings, &graph, &catalog, &NoIndex, &fs).unwrap();

    assert_eq!(
        world.current_state(ATMOS_ID).as_deref(),
        Some("WAREHOUSE:DATASET:Uninitialized")
    );
}

#[test]
fn latest_version_is_numeric_and_skips_empty_ones() {
    let fs = MockFileSystem::new();
    let root = Path::new("/staging");
    let atmos = id(ATMOS_ID);
    for v in ["v9", "v10", "v2.3"] {
        version_file(&fs, root, ATMOS_ID, v);
    }
    let base = root.join(facet_path(&atmos));
    fs.add_dir(base.join("v11"));
    fs.add_file(base.join("README"), "not a version");

    assert_eq!(latest_version_dir(&fs, root, &atmos), Some(base.join("v10")));
    assert_eq!(latest_version_dir(&fs, Path::new("/elsewhere"), &atmos), None);
}

#[test]
fn serial_and_parallel_discovery_agree() {
    let parallel = TestWorld::new();
    let serial = TestWorld::with(|b| b.serial());
    for world in [&parallel, &serial] {
        world.stage(OCEAN_ID, "v1");
        let graph = world.graph(POSTPROCESS_GRAPH);
        let catalog = world.catalog(NATIVE_CATALOG);
        world.datasets(&graph, &catalog);
    }

    for raw in [ATMOS_ID, OCEAN_ID, SEAICE_ID] {
        assert_eq!(parallel.current_state(raw), serial.current_state(raw));
    }
    assert_eq!(
        serial.current_state(OCEAN_ID).as_deref(),
        Some("WAREHOUSE:DATASET:Unpublished")
    );
}

#[test]
fn preview_reports_initial_markers_without_writing() {
    let world = TestWorld::new();
    let roots = &world.settings.roots;
    let fs = MockFileSystem::new();
    version_file(&fs, &roots.staging, OCEAN_ID, "v1");
    let graph = world.graph(POSTPROCESS_GRAPH);
    let catalog = world.catalog(NATIVE_CATALOG);

    let previews = preview(&world.settings, &graph, &catalog, &NoIndex, &fs).unwrap();
    let states: Vec<String> = previews
        .iter()
        .map(|p| p.state.as_ref().unwrap().to_string())
        .collect();
    assert_eq!(
        states,
        vec![
            "WAREHOUSE:DATASET:Uninitialized",
            "WAREHOUSE:DATASET:Unpublished",
            "WAREHOUSE:DATASET:Uninitialized",
        ]
    );
    for raw in [ATMOS_ID, OCEAN_ID, SEAICE_ID] {
        assert!(!status_path(&world.settings.status_root, raw).exists(), "{raw}");
    }

    // An existing log is reported as it stands.
    initialize(&world.settings, &graph, &catalog, &NoIndex, &fs).unwrap();
    world.write_state(ATMOS_ID, "WAREHOUSE:POSTPROCESS:Ready");
    let previews = preview(&world.settings, &graph, &catalog, &NoIndex, &fs).unwrap();
    assert_eq!(
        previews[0].state.as_ref().map(ToString::to_string).as_deref(),
        Some("WAREHOUSE:POSTPROCESS:Ready")
    );
    assert_eq!(world.events(ATMOS_ID).len(), 2);
}

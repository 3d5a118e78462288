// tests/runtime_fake_scheduler.rs

use std::error::Error;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use warehouse::engine::{Runtime, RuntimeEvent};
use warehouse::status::Verb;
use warehouse_test_utils::builders::{ATMOS_ID, OCEAN_ID, SEAICE_ID, TestWorld};
use warehouse_test_utils::fake_scheduler::{FakeMode, FakeScheduler};
use warehouse_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn engaged(world: &TestWorld, raw: &str) -> bool {
    world
        .events(raw)
        .last()
        .is_some_and(|e| e.state.verb == Verb::Engaged)
}

#[tokio::test]
async fn runtime_submits_ready_jobs_and_exits_once_everything_passes() -> TestResult {
    init_tracing();
    let world = TestWorld::new();
    let core = world.core("POSTPROCESS");
    let scheduler = FakeScheduler::new();

    let (tx, rx) = mpsc::channel(16);
    let runtime = Runtime::new(core, rx, scheduler.clone(), Duration::from_secs(1));
    let handle = tokio::spawn(runtime.run());

    tx.send(RuntimeEvent::Sweep).await?;
    with_timeout(async {
        while !(engaged(&world, ATMOS_ID) && engaged(&world, SEAICE_ID)) {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    assert_eq!(scheduler.submission_count(), 2);
    let scripts = scheduler.submitted();
    assert!(scripts.iter().all(|s| s.path.exists()));
    let atmos_engaged = world.events(ATMOS_ID).last().cloned().unwrap();
    assert_eq!(atmos_engaged.params.get("job_id"), Some("fake-1"));

    // The wrappers would append these.
    world.write_state(ATMOS_ID, "POSTPROCESS:ClimoGen:Pass");
    world.write_state(OCEAN_ID, "POSTPROCESS:MpasAnalysis:Pass");
    world.write_state(SEAICE_ID, "POSTPROCESS:MpasAnalysis:Pass");
    tx.send(RuntimeEvent::Sweep).await?;

    let core = with_timeout(handle).await??;
    assert!(core.all_terminal());
    assert!(core.pool().is_empty());
    assert!(scheduler.cancelled().is_empty());
    for raw in [ATMOS_ID, OCEAN_ID, SEAICE_ID] {
        assert_eq!(
            world.current_state(raw).as_deref(),
            Some("WAREHOUSE:POSTPROCESS:Pass")
        );
        assert!(!world.is_locked(raw));
    }
    Ok(())
}

#[tokio::test]
async fn strict_runtime_stops_with_a_submission_error() -> TestResult {
    init_tracing();
    let world = TestWorld::with(|b| b.strict());
    let core = world.core("POSTPROCESS");
    let scheduler = FakeScheduler::new();
    scheduler.set_mode(FakeMode::NoJobId);

    let (tx, rx) = mpsc::channel(16);
    let runtime = Runtime::new(core, rx, scheduler.clone(), Duration::from_secs(1));
    tx.send(RuntimeEvent::Sweep).await?;

    let result = with_timeout(runtime.run()).await;
    assert!(matches!(
        result,
        Err(warehouse::errors::WarehouseError::Submission(_))
    ));
    assert_eq!(scheduler.submission_count(), 1);
    // The queued pair ticket is never submitted and gives its locks back.
    for raw in [ATMOS_ID, OCEAN_ID, SEAICE_ID] {
        assert!(!world.is_locked(raw));
    }
    Ok(())
}

#[tokio::test]
async fn lenient_runtime_gives_up_after_max_attempts() -> TestResult {
    init_tracing();
    let world = TestWorld::with(|b| b.max_attempts(2).filter("*.atmos.*"));
    let core = world.core("POSTPROCESS");
    let scheduler = FakeScheduler::new();
    scheduler.set_mode(FakeMode::NoJobId);

    let (tx, rx) = mpsc::channel(16);
    let runtime = Runtime::new(core, rx, scheduler.clone(), Duration::from_secs(1));
    tx.send(RuntimeEvent::Sweep).await?;
    tx.send(RuntimeEvent::Sweep).await?;

    let core = with_timeout(runtime.run()).await?;
    assert!(core.all_terminal());
    assert_eq!(scheduler.submission_count(), 2);
    assert_eq!(
        world.current_state(ATMOS_ID).as_deref(),
        Some("WAREHOUSE:POSTPROCESS:Fail")
    );
    Ok(())
}

#[tokio::test]
async fn shutdown_leaves_submitted_jobs_alone() -> TestResult {
    init_tracing();
    let world = TestWorld::new();
    let core = world.core("POSTPROCESS");
    let scheduler = FakeScheduler::new();

    let (tx, rx) = mpsc::channel(16);
    let runtime = Runtime::new(core, rx, scheduler.clone(), Duration::from_secs(1));
    tx.send(RuntimeEvent::Sweep).await?;
    tx.send(RuntimeEvent::ShutdownRequested).await?;

    let core = with_timeout(runtime.run()).await?;
    assert_eq!(core.in_flight().len(), 2);
    assert!(scheduler.cancelled().is_empty());
    assert!(world.is_locked(ATMOS_ID));
    Ok(())
}

#[tokio::test]
async fn closed_channel_ends_the_run() -> TestResult {
    let world = TestWorld::new();
    let core = world.core("POSTPROCESS");
    let (tx, rx) = mpsc::channel(1);
    drop(tx);

    let runtime = Runtime::new(core, rx, FakeScheduler::new(), Duration::from_secs(1));
    let core = with_timeout(runtime.run()).await?;
    assert!(core.pool().is_empty());
    Ok(())
}

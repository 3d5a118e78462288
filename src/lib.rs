// src/lib.rs

pub mod batch;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod graph;
pub mod index;
pub mod jobs;
pub mod logging;
pub mod status;
pub mod types;
pub mod watch;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::batch::{LocalScheduler, SlurmScheduler};
use crate::catalog::Catalog;
use crate::cli::CliArgs;
use crate::config::{Settings, default_config_path, load_settings};
use crate::dataset::Dataset;
use crate::engine::{
    CoreRuntime, Preview, Runtime, RuntimeEvent, RuntimeOptions, initialize, preview,
    spawn_sweep_ticker,
};
use crate::fs::{FileSystem, RealFileSystem};
use crate::graph::TransitionGraph;
use crate::index::{ListIndex, NoIndex, PublicationIndex};
use crate::status::State;
use crate::types::BackendKind;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings, transition graph and catalog loading
/// - dataset discovery
/// - core / runtime
/// - batch scheduler adapter
/// - status-log listener and sweep ticker
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let explicit = args.common.config.is_some();
    let config_path = args.common.config.clone().unwrap_or_else(default_config_path);
    let settings = Arc::new(load_settings(&config_path, explicit, &args.common.overrides())?);

    let graph = TransitionGraph::load(&settings.graph)?;
    let catalog = Catalog::load(&settings.catalog)?;
    let namespace = args.command.namespace();
    graph.workflow(namespace)?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let index: Box<dyn PublicationIndex> = match &settings.index {
        Some(path) => Box::new(ListIndex::load(fs.as_ref(), path)?),
        None => Box::new(NoIndex),
    };

    if args.common.dry_run {
        let previews = preview(&settings, &graph, &catalog, index.as_ref(), fs.as_ref())?;
        print_dry_run(namespace, &settings, &previews);
        return Ok(());
    }

    let datasets = initialize(&settings, &graph, &catalog, index.as_ref(), fs.as_ref())?;

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(256);

    let _listener = crate::watch::spawn_listener(&settings.status_root, rt_tx.clone())?;

    // Ctrl-C → graceful shutdown. Submitted jobs keep running.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let _ticker = spawn_sweep_ticker(rt_tx.clone(), settings.run.sweep_interval);

    // First full pass over every dataset.
    rt_tx.send(RuntimeEvent::Sweep).await?;

    let options = RuntimeOptions {
        namespace: namespace.to_string(),
        strict: settings.run.strict,
        max_attempts: settings.run.max_attempts,
    };
    let core = CoreRuntime::new(
        graph,
        Arc::clone(&settings),
        options,
        datasets,
        Box::new(catalog),
        fs,
    )?;

    let submit_timeout = settings.scheduler.submit_timeout;
    let core = match settings.scheduler.backend {
        BackendKind::Slurm => {
            let scheduler = SlurmScheduler::new(settings.scheduler.slurm.clone());
            Runtime::new(core, rt_rx, scheduler, submit_timeout).run().await?
        }
        BackendKind::Local => {
            Runtime::new(core, rt_rx, LocalScheduler::new(), submit_timeout).run().await?
        }
    };

    log_summary(core.datasets());
    Ok(())
}

/// Count of datasets per current state.
fn state_counts<'a>(states: impl Iterator<Item = Option<&'a State>>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for state in states {
        *counts.entry(state_label(state)).or_insert(0) += 1;
    }
    counts
}

fn state_label(state: Option<&State>) -> String {
    state.map_or_else(|| "<none>".to_string(), ToString::to_string)
}

fn log_summary<'a>(datasets: impl Iterator<Item = &'a Dataset>) {
    for (state, count) in state_counts(datasets.map(Dataset::current_state)) {
        info!(%state, count, "final state");
    }
}

/// Dry-run output: every selected dataset and the state it is in, or would
/// start in. Nothing is written.
fn print_dry_run(namespace: &str, settings: &Settings, previews: &[Preview]) {
    println!("warehouse dry-run");
    println!("  namespace = {namespace}");
    println!("  status_root = {}", settings.status_root.display());
    println!("  scheduler = {:?}", settings.scheduler.backend);
    println!();

    println!("datasets ({}):", previews.len());
    for Preview { dataset: ds, state } in previews {
        println!("  - {}", ds.id);
        println!("      state: {}", state_label(state.as_ref()));
        if let (Some(start), Some(end)) = (ds.start_year, ds.end_year) {
            println!("      years: {start}-{end}");
        }
        if let Some(dir) = &ds.locations.staging {
            println!("      staging: {}", dir.display());
        }
        if let Some(dir) = &ds.locations.publication {
            println!("      publication: {}", dir.display());
        }
    }

    println!();
    println!("states:");
    for (state, count) in state_counts(previews.iter().map(|p| p.state.as_ref())) {
        println!("  {count:>6}  {state}");
    }

    debug!("dry-run complete (no submission)");
}

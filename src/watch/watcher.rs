// src/watch/watcher.rs

use std::path::PathBuf;

use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::RuntimeEvent;
use crate::watch::event_handler::{is_relevant_kind, process_status_change};
use crate::watch::patterns::StatusFilePattern;

/// Keeps the underlying watcher alive. Dropping it stops watching.
pub struct ListenerHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle").finish()
    }
}

/// Watch `status_root` recursively and send one
/// `RuntimeEvent::StatusChanged` per modified status log.
///
/// The notify callback runs on the watcher's own thread and only forwards
/// raw events into an unbounded channel; identity resolution happens in a
/// tokio task, and the only thing that reaches the coordinating loop is the
/// runtime channel.
pub fn spawn_listener(
    status_root: impl Into<PathBuf>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<ListenerHandle> {
    let root = status_root.into();
    std::fs::create_dir_all(&root).with_context(|| format!("creating status root {:?}", root))?;
    let root = root.canonicalize().unwrap_or(root);
    let pattern = StatusFilePattern::new()?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    eprintln!("warehouse: failed to forward notify event: {err}");
                }
            }
            Err(err) => eprintln!("warehouse: file watch error: {err}"),
        },
        Config::default(),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!("status listener started on {:?}", root);

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !is_relevant_kind(&event.kind) {
                continue;
            }
            debug!(?event, "received notify event");
            for path in &event.paths {
                if !process_status_change(&root, path, &pattern, &runtime_tx).await {
                    warn!("runtime channel closed; stopping status listener");
                    return;
                }
            }
        }
        debug!("status listener loop finished");
    });

    Ok(ListenerHandle { _inner: watcher })
}

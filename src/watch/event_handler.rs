// src/watch/event_handler.rs

//! Turns one filesystem event path into at most one `StatusChanged`.

use std::path::Path;

use notify::EventKind;
use notify::event::ModifyKind;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dataset::DatasetId;
use crate::engine::RuntimeEvent;
use crate::status::read_identity;
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::StatusFilePattern;

/// Content changes and creations; access, metadata-only and removal events
/// are ignored.
pub fn is_relevant_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Any
    )
}

/// Resolve `path` to the dataset whose log it is. `None` for anything that
/// is not a readable status log with an identity marker.
pub fn resolve_dataset(root: &Path, path: &Path, pattern: &StatusFilePattern) -> Option<DatasetId> {
    if !path.is_file() {
        return None;
    }
    let rel = relative_str(root, path)?;
    if !pattern.matches(&rel) {
        return None;
    }

    match read_identity(path) {
        Ok(Some(raw)) => match DatasetId::parse(&raw) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(path = ?path, error = %e, "status log carries an unparseable identity");
                None
            }
        },
        Ok(None) => {
            warn!(path = ?path, "status log has no identity marker");
            None
        }
        Err(e) => {
            debug!(path = ?path, error = %e, "status log vanished before it could be read");
            None
        }
    }
}

/// Returns `false` once the runtime channel is closed.
pub async fn process_status_change(
    root: &Path,
    path: &Path,
    pattern: &StatusFilePattern,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) -> bool {
    let Some(dataset) = resolve_dataset(root, path, pattern) else {
        return true;
    };
    debug!(dataset = %dataset, "status log changed");
    if let Err(err) = runtime_tx.send(RuntimeEvent::StatusChanged { dataset }).await {
        warn!("failed to send RuntimeEvent::StatusChanged: {err}");
        return false;
    }
    true
}

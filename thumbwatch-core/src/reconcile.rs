//! Catch-up walk over a tree that already has content.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::engine::EngineShared;
use crate::error::{Result, WatchError};

/// What one reconciliation walk did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Subdirectories that were not watched before the walk.
    pub subdirs_watched: usize,
    pub thumbnails_scheduled: usize,
    pub thumbnails_present: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.subdirs_watched == 0 && self.thumbnails_scheduled == 0
    }
}

pub(crate) async fn reconcile(shared: &Arc<EngineShared>, root: &Path) -> Result<ReconcileReport> {
    let emitter = shared.registry.emitter(root).await?;
    let mut report = ReconcileReport::default();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                emitter.error(dir.clone(), WatchError::io(&dir, err)).await;
                continue;
            }
        };

        let mut children = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => children.push(entry.path()),
                Ok(None) => break,
                Err(err) => {
                    emitter.error(dir.clone(), WatchError::io(&dir, err)).await;
                    break;
                }
            }
        }
        children.sort();

        let mut subdirs = Vec::new();
        for path in children {
            let meta = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta,
                Err(err) => {
                    emitter.error(path.clone(), WatchError::io(&path, err)).await;
                    continue;
                }
            };

            if meta.is_dir() {
                if !shared.policy.should_watch_subdir(root, &path) {
                    continue;
                }
                match shared.watch_subdir(root, &path).await {
                    Ok(()) => report.subdirs_watched += 1,
                    Err(WatchError::SubdirAlreadyWatched(_)) => {}
                    // Root removed mid-walk.
                    Err(err @ WatchError::RootNotWatched(_)) => return Err(err),
                    Err(err) => {
                        debug!(target: "thumbwatch::reconcile", path = %path.display(), error = %err, "subdirectory not watched");
                        continue;
                    }
                }
                subdirs.push(path);
            } else if meta.is_file() && shared.policy.should_create_thumb(root, &path) {
                let thumb = shared.policy.thumb_path(&path);
                match tokio::fs::try_exists(&thumb).await {
                    Ok(true) => report.thumbnails_present += 1,
                    Ok(false) => {
                        shared.spawn_create(emitter.clone(), path);
                        report.thumbnails_scheduled += 1;
                    }
                    Err(err) => {
                        emitter.error(thumb.clone(), WatchError::io(&thumb, err)).await;
                    }
                }
            }
        }

        // Reverse so the stack pops them in sorted order.
        pending.extend(subdirs.into_iter().rev());
    }

    info!(
        target: "thumbwatch::reconcile",
        root = %root.display(),
        subdirs_watched = report.subdirs_watched,
        thumbnails_scheduled = report.thumbnails_scheduled,
        thumbnails_present = report.thumbnails_present,
        "reconciliation finished"
    );
    Ok(report)
}

//! Per-root watch loop.
//!
//! Consumes one root's notification stream strictly in arrival order and
//! turns each message into registry updates, spawned thumbnail jobs, or
//! error events. It never waits on a job it spawned.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::engine::EngineShared;
use crate::error::WatchError;
use crate::event::EventEmitter;
use crate::fs_watch::{ChangeKind, Notice, WatchMessage};

pub(crate) fn spawn_watch_loop(
    shared: Arc<EngineShared>,
    emitter: EventEmitter,
    mut rx: mpsc::Receiver<WatchMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let root = emitter.root().to_path_buf();
        debug!(target: "thumbwatch::dispatcher", root = %root.display(), "watch loop running");

        loop {
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                msg = rx.recv() => msg,
            };

            // Subscription closed.
            let Some(msg) = msg else { break };

            match msg {
                WatchMessage::Notice(notice) => {
                    handle_notice(&shared, &root, &emitter, notice).await;
                }
                WatchMessage::Error(error) => {
                    emitter.error(PathBuf::new(), WatchError::Source(error)).await;
                }
            }
        }

        debug!(target: "thumbwatch::dispatcher", root = %root.display(), "watch loop stopped");
    })
}

async fn handle_notice(
    shared: &Arc<EngineShared>,
    root: &Path,
    emitter: &EventEmitter,
    notice: Notice,
) {
    let Notice { path, kind } = notice;
    trace!(target: "thumbwatch::dispatcher", root = %root.display(), path = %path.display(), ?kind, "notification");

    match kind {
        ChangeKind::Created => on_created(shared, root, emitter, path).await,
        ChangeKind::Other => on_other(shared, root, emitter, path).await,
    }
}

async fn on_created(shared: &Arc<EngineShared>, root: &Path, emitter: &EventEmitter, path: PathBuf) {
    let meta = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta,
        // Gone again before we could look at it.
        Err(err) => {
            emitter.error(path.clone(), WatchError::io(&path, err)).await;
            return;
        }
    };

    if meta.is_dir() {
        if !shared.policy.should_watch_subdir(root, &path) {
            debug!(target: "thumbwatch::dispatcher", path = %path.display(), "subdirectory rejected by policy");
            return;
        }
        match shared.watch_subdir(root, &path).await {
            Ok(()) | Err(WatchError::SubdirAlreadyWatched(_)) => {}
            // Already reported as an event.
            Err(err) => {
                debug!(target: "thumbwatch::dispatcher", path = %path.display(), error = %err, "failed to watch subdirectory");
            }
        }
    } else if meta.is_file() {
        if shared.policy.should_create_thumb(root, &path) {
            shared.spawn_create(emitter.clone(), path);
        } else {
            trace!(target: "thumbwatch::dispatcher", path = %path.display(), "file rejected by policy");
        }
    }
}

async fn on_other(shared: &Arc<EngineShared>, root: &Path, emitter: &EventEmitter, path: PathBuf) {
    match tokio::fs::metadata(&path).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            shared.forget_subdir(root, &path).await;
            // Removal is only attempted for paths that could have been
            // thumbnailed, so the conservative default policy deletes nothing.
            if shared.policy.should_create_thumb(root, &path) {
                shared.spawn_remove(emitter.clone(), path);
            }
        }
        Err(err) => {
            emitter.error(path.clone(), WatchError::io(&path, err)).await;
        }
    }
}

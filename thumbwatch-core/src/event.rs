use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::WatchError;

/// Kind of outcome reported to a root's event sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    Error,
    ThumbnailCreated,
    ThumbnailRemoved,
    SubdirWatched,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::ThumbnailCreated => "ThumbnailCreated",
            Self::ThumbnailRemoved => "ThumbnailRemoved",
            Self::SubdirWatched => "SubdirWatched",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single watch or thumbnail outcome for one root.
///
/// `path` is the thumbnail path for thumbnail events, the subdirectory for
/// `SubdirWatched`, and whatever path the failure concerns for `Error`
/// (empty for notification-source errors).
#[derive(Clone, Debug)]
pub struct Event {
    pub root: PathBuf,
    pub path: PathBuf,
    pub kind: EventKind,
    pub error: Option<Arc<WatchError>>,
}

impl Event {
    pub fn is_error(&self) -> bool {
        self.kind == EventKind::Error
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(err) => write!(
                f,
                "{}: {} @ {} ({})",
                self.kind,
                err,
                self.path.display(),
                self.root.display()
            ),
            None => write!(
                f,
                "{}: {} ({})",
                self.kind,
                self.path.display(),
                self.root.display()
            ),
        }
    }
}

/// Caller-owned outlet for one root's events.
pub type EventSender = mpsc::Sender<Event>;

/// Cloneable handle that stamps events with their root and delivers them to
/// the root's sink until the root is retired.
#[derive(Clone)]
pub(crate) struct EventEmitter {
    root: Arc<PathBuf>,
    sink: EventSender,
    retired: CancellationToken,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("root", &self.root)
            .field("retired", &self.retired.is_cancelled())
            .finish()
    }
}

impl EventEmitter {
    pub(crate) fn new(root: PathBuf, sink: EventSender, retired: CancellationToken) -> Self {
        Self {
            root: Arc::new(root),
            sink,
            retired,
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.is_cancelled()
    }

    pub(crate) async fn emit(&self, kind: EventKind, path: PathBuf, error: Option<WatchError>) {
        let event = Event {
            root: self.root.as_ref().clone(),
            path,
            kind,
            error: error.map(Arc::new),
        };

        if self.retired.is_cancelled() {
            debug!(target: "thumbwatch::event", root = %self.root.display(), %event, "root retired, dropping event");
            return;
        }

        // A full sink must not keep a retired root's events alive.
        tokio::select! {
            biased;
            _ = self.retired.cancelled() => {
                debug!(target: "thumbwatch::event", root = %self.root.display(), "root retired while sink was full, dropping event");
            }
            sent = self.sink.send(event) => {
                if let Err(err) = sent {
                    warn!(target: "thumbwatch::event", root = %self.root.display(), event = %err.0, "event sink closed");
                }
            }
        }
    }

    pub(crate) async fn error(&self, path: impl Into<PathBuf>, error: WatchError) {
        self.emit(EventKind::Error, path.into(), Some(error)).await;
    }

    pub(crate) async fn success(&self, kind: EventKind, path: impl Into<PathBuf>) {
        self.emit(kind, path.into(), None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_error_and_root() {
        let event = Event {
            root: "/g".into(),
            path: "/g/album/.thumbs/a.png".into(),
            kind: EventKind::ThumbnailCreated,
            error: None,
        };
        assert_eq!(
            event.to_string(),
            "ThumbnailCreated: /g/album/.thumbs/a.png (/g)"
        );

        let failed = Event {
            kind: EventKind::Error,
            error: Some(Arc::new(WatchError::Source("queue overflow".into()))),
            path: PathBuf::new(),
            ..event
        };
        assert_eq!(
            failed.to_string(),
            "Error: notification source error: queue overflow @  (/g)"
        );
    }

    #[tokio::test]
    async fn retired_emitter_drops_events() {
        let (tx, mut rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let emitter = EventEmitter::new("/g".into(), tx, token.clone());

        emitter.success(EventKind::SubdirWatched, "/g/album").await;
        token.cancel();
        emitter.success(EventKind::SubdirWatched, "/g/other").await;
        drop(emitter);

        let first = rx.recv().await.expect("first event delivered");
        assert_eq!(first.path, PathBuf::from("/g/album"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn retiring_unblocks_a_full_sink() {
        let (tx, mut rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        let emitter = EventEmitter::new("/g".into(), tx, token.clone());

        emitter.success(EventKind::SubdirWatched, "/g/a").await;
        let pending = {
            let emitter = emitter.clone();
            tokio::spawn(async move { emitter.success(EventKind::SubdirWatched, "/g/b").await })
        };
        tokio::task::yield_now().await;
        token.cancel();
        pending.await.unwrap();

        assert_eq!(rx.recv().await.unwrap().path, PathBuf::from("/g/a"));
        drop(emitter);
        assert!(rx.recv().await.is_none());
    }
}

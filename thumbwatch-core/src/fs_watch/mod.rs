//! Notification source seam.
//!
//! The engine only needs a per-root subscription that can grow and shrink by
//! single directories and that reports whether a path was *created* or
//! touched in some other way. [`NotifyBackend`] provides that on top of the
//! `notify` crate; tests and embedders with their own event source can plug in
//! any other [`WatchBackend`].

use std::fmt;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::error::Result;

mod notify_backend;

pub use notify_backend::NotifyBackend;

/// Whether a notification announced a new path or anything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Other,
}

/// One filesystem notification for one path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl Notice {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Created,
        }
    }

    pub fn other(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Other,
        }
    }
}

/// Everything a subscription can deliver to its dispatcher.
pub enum WatchMessage {
    Notice(Notice),
    /// Source-level failure not tied to a path.
    Error(String),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Notice(notice) => f
                .debug_struct("WatchMessage::Notice")
                .field("kind", &notice.kind)
                .field("path", &notice.path)
                .finish(),
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
        }
    }
}

/// Live subscription for one root.
pub trait WatchHandle: Send {
    /// Start delivering notifications for `path` (non-recursively).
    fn add(&mut self, path: &Path) -> Result<()>;
    /// Stop delivering notifications for `path`.
    fn remove(&mut self, path: &Path) -> Result<()>;
    /// Stop all delivery. The message channel closes once the handle lets go
    /// of its sender.
    fn close(&mut self);
}

/// Result of subscribing a root: the handle to manage it and the stream of
/// its messages.
pub struct Subscription {
    pub handle: Box<dyn WatchHandle>,
    pub messages: mpsc::Receiver<WatchMessage>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Factory for per-root subscriptions.
pub trait WatchBackend: Send + Sync + 'static {
    /// Subscribe to notifications for `root` itself. Failing here must leave
    /// nothing behind.
    fn subscribe(&self, root: &Path) -> Result<Subscription>;
}

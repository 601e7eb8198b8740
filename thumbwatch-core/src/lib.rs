//! # Thumbwatch Core
//!
//! Watch-state registry and event-dispatch engine that keeps a mirror of
//! image thumbnails in sync with a set of watched directory trees.
//!
//! ## Overview
//!
//! - **Registry**: one entry per watched root, each with its own set of
//!   watched subdirectories and its own event sink
//! - **Dispatch**: a task per root turns raw filesystem notifications into
//!   watch-subdir, create-thumbnail and remove-thumbnail actions
//! - **Policy**: every decision (where thumbnails live, which directories and
//!   files count) is delegated to a [`ThumbnailPolicy`]
//! - **Reconciliation**: an idempotent walk that catches an existing tree up
//!   to the state it would reach if every file had just been created
//! - **Retry**: files that are not yet readable images are retried with a
//!   linear backoff, since a create notification can beat the writer
//!
//! Outcomes are never returned from the background work; they arrive as
//! [`Event`]s on the channel handed to [`ThumbWatcher::add_root`].
//!
//! ## Examples
//!
//! ```no_run
//! use thumbwatch_core::{EventKind, MirrorPolicy, ThumbWatcher, ThumbnailPrefs};
//!
//! # async fn run() -> Result<(), thumbwatch_core::WatchError> {
//! let watcher = ThumbWatcher::builder()
//!     .prefs(ThumbnailPrefs::new(160, 120))
//!     .policy(MirrorPolicy::default().with_max_depth(1))
//!     .build();
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(256);
//! watcher.add_root("/srv/photos", tx).await?;
//! let report = watcher.reconcile("/srv/photos").await?;
//! println!("{} thumbnails queued", report.thumbnails_scheduled);
//!
//! while let Some(event) = rx.recv().await {
//!     if event.kind == EventKind::Error {
//!         eprintln!("{event}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Image decode/resample/encode adapter
pub mod codec;

mod dispatcher;

/// Caller-facing engine handle
pub mod engine;

/// Error types
pub mod error;

/// Events reported to each root's sink
pub mod event;

/// Filesystem notification adapters
pub mod fs_watch;

/// Path helpers for writing policies
pub mod paths;

/// Policy trait and the built-in layouts
pub mod policy;

/// Thumbnail preferences and retry tuning
pub mod prefs;

/// Catch-up walk over existing trees
pub mod reconcile;

mod registry;

mod thumbnail;

pub use codec::{ImageCodec, ImageCrateCodec, OpenError};
pub use engine::{ThumbWatcher, ThumbWatcherBuilder};
pub use error::{Result, WatchError};
pub use event::{Event, EventKind, EventSender};
pub use fs_watch::{
    ChangeKind, Notice, NotifyBackend, Subscription, WatchBackend, WatchHandle, WatchMessage,
};
pub use policy::{DefaultPolicy, FnPolicy, MirrorPolicy, ThumbnailPolicy};
pub use prefs::{ResampleAlgorithm, RetryPolicy, ThumbnailPrefs};
pub use reconcile::ReconcileReport;

//! Watched roots and their watched subdirectories.
//!
//! All state sits behind one async mutex. Each operation takes the lock for
//! its whole duration, so live dispatchers, reconciliation walks and caller
//! calls can race freely without tearing the maps. Events are never sent
//! while the lock is held; callers get back what to report instead.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, WatchError};
use crate::event::EventEmitter;
use crate::fs_watch::WatchHandle;

pub(crate) struct RootEntry {
    pub(crate) handle: Box<dyn WatchHandle>,
    pub(crate) subdirs: HashSet<PathBuf>,
    pub(crate) emitter: EventEmitter,
    pub(crate) cancel: CancellationToken,
    pub(crate) dispatcher: JoinHandle<()>,
}

impl RootEntry {
    /// Close the subscription and stop the dispatcher. The dispatcher exits
    /// at its next scheduling point; the retired token also stops any late
    /// job events from reaching the sink.
    pub(crate) fn retire(mut self) {
        self.cancel.cancel();
        self.handle.close();
        debug!(
            target: "thumbwatch::registry",
            root = %self.emitter.root().display(),
            subdirs = self.subdirs.len(),
            dispatcher_finished = self.dispatcher.is_finished(),
            "root retired"
        );
    }
}

impl fmt::Debug for RootEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootEntry")
            .field("subdirs", &self.subdirs.len())
            .field("retired", &self.emitter.is_retired())
            .field("dispatcher_finished", &self.dispatcher.is_finished())
            .finish()
    }
}

#[derive(Default)]
pub(crate) struct Registry {
    roots: Mutex<HashMap<PathBuf, RootEntry>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Registry");
        match self.roots.try_lock() {
            Ok(guard) => {
                debug.field("root_count", &guard.len());
            }
            Err(_) => {
                debug.field("roots", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a root. `start` runs under the lock only once the path is
    /// known to be free, so a rejected duplicate has no side effects.
    pub(crate) async fn insert_root<F>(&self, root: &Path, start: F) -> Result<()>
    where
        F: FnOnce() -> Result<RootEntry>,
    {
        let mut guard = self.roots.lock().await;
        if guard.contains_key(root) {
            return Err(WatchError::RootAlreadyWatched(root.to_path_buf()));
        }
        let entry = start()?;
        guard.insert(root.to_path_buf(), entry);
        Ok(())
    }

    pub(crate) async fn remove_root(&self, root: &Path) -> Result<RootEntry> {
        self.roots
            .lock()
            .await
            .remove(root)
            .ok_or_else(|| WatchError::RootNotWatched(root.to_path_buf()))
    }

    pub(crate) async fn drain(&self) -> Vec<RootEntry> {
        self.roots.lock().await.drain().map(|(_, entry)| entry).collect()
    }

    pub(crate) async fn contains_root(&self, root: &Path) -> bool {
        self.roots.lock().await.contains_key(root)
    }

    pub(crate) async fn roots(&self) -> BTreeSet<PathBuf> {
        self.roots.lock().await.keys().cloned().collect()
    }

    pub(crate) async fn subdirs(&self, root: &Path) -> Result<BTreeSet<PathBuf>> {
        let guard = self.roots.lock().await;
        let entry = guard
            .get(root)
            .ok_or_else(|| WatchError::RootNotWatched(root.to_path_buf()))?;
        Ok(entry.subdirs.iter().cloned().collect())
    }

    pub(crate) async fn emitter(&self, root: &Path) -> Result<EventEmitter> {
        let guard = self.roots.lock().await;
        guard
            .get(root)
            .map(|entry| entry.emitter.clone())
            .ok_or_else(|| WatchError::RootNotWatched(root.to_path_buf()))
    }

    /// Subscribe `subdir` and record membership. On failure the returned
    /// emitter (if the root exists) lets the caller report it.
    pub(crate) async fn add_subdir(
        &self,
        root: &Path,
        subdir: &Path,
    ) -> std::result::Result<EventEmitter, (WatchError, Option<EventEmitter>)> {
        let mut guard = self.roots.lock().await;
        let Some(entry) = guard.get_mut(root) else {
            return Err((WatchError::RootNotWatched(root.to_path_buf()), None));
        };
        if entry.subdirs.contains(subdir) {
            return Err((
                WatchError::SubdirAlreadyWatched(subdir.to_path_buf()),
                Some(entry.emitter.clone()),
            ));
        }
        if let Err(err) = entry.handle.add(subdir) {
            return Err((err, Some(entry.emitter.clone())));
        }
        entry.subdirs.insert(subdir.to_path_buf());
        Ok(entry.emitter.clone())
    }

    /// Drop membership, then unsubscribe. Membership is gone even when the
    /// unsubscribe itself fails.
    pub(crate) async fn remove_subdir(&self, root: &Path, subdir: &Path) -> Result<()> {
        let mut guard = self.roots.lock().await;
        let entry = guard
            .get_mut(root)
            .ok_or_else(|| WatchError::RootNotWatched(root.to_path_buf()))?;
        if !entry.subdirs.remove(subdir) {
            return Err(WatchError::SubdirNotWatched(subdir.to_path_buf()));
        }
        entry.handle.remove(subdir)
    }
}

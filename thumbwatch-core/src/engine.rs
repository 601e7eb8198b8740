//! Caller-facing engine.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::codec::{ImageCodec, ImageCrateCodec};
use crate::dispatcher::spawn_watch_loop;
use crate::error::{Result, WatchError};
use crate::event::{EventEmitter, EventKind, EventSender};
use crate::fs_watch::{NotifyBackend, WatchBackend};
use crate::policy::{DefaultPolicy, ThumbnailPolicy};
use crate::prefs::{ResampleAlgorithm, RetryPolicy, ThumbnailPrefs};
use crate::reconcile::{self, ReconcileReport};
use crate::registry::{Registry, RootEntry};
use crate::thumbnail::ThumbnailJob;

/// State shared by the engine handle, every dispatcher and every
/// reconciliation walk.
pub(crate) struct EngineShared {
    pub(crate) registry: Registry,
    pub(crate) policy: Arc<dyn ThumbnailPolicy>,
    codec: Arc<dyn ImageCodec>,
    backend: Arc<dyn WatchBackend>,
    prefs: RwLock<ThumbnailPrefs>,
    retry: RetryPolicy,
    jobs: TaskTracker,
    // Serializes `wait_for_jobs` so one caller cannot reopen the tracker
    // under another.
    draining: Mutex<()>,
}

impl EngineShared {
    fn job(&self, emitter: EventEmitter) -> ThumbnailJob {
        ThumbnailJob {
            policy: Arc::clone(&self.policy),
            codec: Arc::clone(&self.codec),
            prefs: *self.prefs.read(),
            retry: self.retry,
            emitter,
        }
    }

    pub(crate) fn spawn_create(&self, emitter: EventEmitter, source: PathBuf) {
        let job = self.job(emitter);
        self.jobs.spawn(job.create(source));
    }

    pub(crate) fn spawn_remove(&self, emitter: EventEmitter, source: PathBuf) {
        let job = self.job(emitter);
        self.jobs.spawn(job.remove(source));
    }

    /// Subscribe `subdir` under `root` and report the outcome on the root's
    /// sink. Registry contract violations are only returned.
    pub(crate) async fn watch_subdir(&self, root: &Path, subdir: &Path) -> Result<()> {
        match self.registry.add_subdir(root, subdir).await {
            Ok(emitter) => {
                debug!(target: "thumbwatch::engine", root = %root.display(), subdir = %subdir.display(), "watching subdirectory");
                emitter.success(EventKind::SubdirWatched, subdir).await;
                Ok(())
            }
            Err((err, emitter)) => {
                if let (false, Some(emitter)) = (err.is_registry_violation(), emitter) {
                    let reported = match &err {
                        WatchError::Subscribe { path, reason } => {
                            WatchError::subscribe(path, reason)
                        }
                        other => WatchError::subscribe(subdir, other),
                    };
                    emitter.error(subdir, reported).await;
                }
                Err(err)
            }
        }
    }

    /// Drop a subdirectory observed deleted. The OS usually tears the watch
    /// down first, so unsubscribe failures are expected and ignored.
    pub(crate) async fn forget_subdir(&self, root: &Path, subdir: &Path) {
        match self.registry.remove_subdir(root, subdir).await {
            Ok(()) => {
                debug!(target: "thumbwatch::engine", root = %root.display(), subdir = %subdir.display(), "deleted subdirectory unwatched");
            }
            Err(WatchError::SubdirNotWatched(_)) | Err(WatchError::RootNotWatched(_)) => {}
            Err(err) => {
                debug!(target: "thumbwatch::engine", subdir = %subdir.display(), error = %err, "deleted subdirectory was already unsubscribed");
            }
        }
    }
}

/// Keeps mirrored thumbnails in sync with a set of watched root directories.
///
/// ```no_run
/// use thumbwatch_core::{MirrorPolicy, ThumbWatcher, ThumbnailPrefs};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let watcher = ThumbWatcher::builder()
///     .prefs(ThumbnailPrefs::new(256, 256))
///     .policy(MirrorPolicy::default())
///     .build();
///
/// let (tx, mut rx) = tokio::sync::mpsc::channel(64);
/// watcher.add_root("/srv/gallery", tx).await?;
/// watcher.reconcile("/srv/gallery").await?;
///
/// while let Some(event) = rx.recv().await {
///     println!("{event}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ThumbWatcher {
    shared: Arc<EngineShared>,
}

impl fmt::Debug for ThumbWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThumbWatcher")
            .field("registry", &self.shared.registry)
            .field("prefs", &*self.shared.prefs.read())
            .field("retry", &self.shared.retry)
            .field("jobs_in_flight", &self.shared.jobs.len())
            .finish()
    }
}

impl Default for ThumbWatcher {
    fn default() -> Self {
        Self::new(ThumbnailPrefs::default())
    }
}

impl ThumbWatcher {
    /// Engine with the conservative default policy, the `notify` backend and
    /// the `image` codec.
    pub fn new(prefs: ThumbnailPrefs) -> Self {
        Self::builder().prefs(prefs).build()
    }

    pub fn builder() -> ThumbWatcherBuilder {
        ThumbWatcherBuilder::default()
    }

    /// Start watching `root`, reporting its outcomes to `sink`.
    ///
    /// Returns once the subscription is live. Nothing is started if the
    /// subscription fails.
    pub async fn add_root(&self, root: impl Into<PathBuf>, sink: EventSender) -> Result<()> {
        let root = root.into();
        let shared = Arc::clone(&self.shared);

        self.shared
            .registry
            .insert_root(&root, || {
                let subscription = shared.backend.subscribe(&root)?;
                let cancel = CancellationToken::new();
                let emitter = EventEmitter::new(root.clone(), sink, cancel.clone());
                let dispatcher = spawn_watch_loop(
                    Arc::clone(&shared),
                    emitter.clone(),
                    subscription.messages,
                    cancel.clone(),
                );
                Ok(RootEntry {
                    handle: subscription.handle,
                    subdirs: Default::default(),
                    emitter,
                    cancel,
                    dispatcher,
                })
            })
            .await?;

        info!(target: "thumbwatch::engine", root = %root.display(), "root watched");
        Ok(())
    }

    /// Stop watching `root`. Must be called before the directory is deleted
    /// or renamed. Jobs already running keep going, but their events are
    /// dropped.
    pub async fn remove_root(&self, root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref();
        let entry = self.shared.registry.remove_root(root).await?;
        entry.retire();
        info!(target: "thumbwatch::engine", root = %root.display(), "root unwatched");
        Ok(())
    }

    pub async fn has_root(&self, root: impl AsRef<Path>) -> bool {
        self.shared.registry.contains_root(root.as_ref()).await
    }

    pub async fn roots(&self) -> BTreeSet<PathBuf> {
        self.shared.registry.roots().await
    }

    pub async fn subdirs(&self, root: impl AsRef<Path>) -> Result<BTreeSet<PathBuf>> {
        self.shared.registry.subdirs(root.as_ref()).await
    }

    /// Watch `subdir` under `root`, reporting `SubdirWatched` (or an `Error`
    /// event when the subscription fails).
    pub async fn add_subdir(&self, root: impl AsRef<Path>, subdir: impl AsRef<Path>) -> Result<()> {
        self.shared
            .watch_subdir(root.as_ref(), subdir.as_ref())
            .await
    }

    pub async fn remove_subdir(
        &self,
        root: impl AsRef<Path>,
        subdir: impl AsRef<Path>,
    ) -> Result<()> {
        self.shared
            .registry
            .remove_subdir(root.as_ref(), subdir.as_ref())
            .await
    }

    /// Apply the watch/thumbnail policy to everything already under `root`,
    /// as if each entry had just been created. Existing thumbnails are left
    /// alone.
    pub async fn reconcile(&self, root: impl AsRef<Path>) -> Result<ReconcileReport> {
        reconcile::reconcile(&self.shared, root.as_ref()).await
    }

    pub fn prefs(&self) -> ThumbnailPrefs {
        *self.shared.prefs.read()
    }

    pub fn thumb_size(&self) -> (u32, u32) {
        self.shared.prefs.read().size()
    }

    /// Dimensions below 1 are clamped to 1.
    pub fn set_thumb_size(&self, width: u32, height: u32) {
        self.shared.prefs.write().set_size(width, height);
    }

    pub fn thumb_dir_mode(&self) -> u32 {
        self.shared.prefs.read().dir_mode()
    }

    pub fn set_thumb_dir_mode(&self, mode: u32) {
        self.shared.prefs.write().set_dir_mode(mode);
    }

    pub fn thumb_algorithm(&self) -> ResampleAlgorithm {
        self.shared.prefs.read().algorithm()
    }

    pub fn set_thumb_algorithm(&self, algorithm: ResampleAlgorithm) {
        self.shared.prefs.write().set_algorithm(algorithm);
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.shared.retry
    }

    pub fn jobs_in_flight(&self) -> usize {
        self.shared.jobs.len()
    }

    /// Wait until every thumbnail job spawned so far has finished.
    /// Concurrent callers wait one after another.
    pub async fn wait_for_jobs(&self) {
        let _draining = self.shared.draining.lock().await;
        self.shared.jobs.close();
        self.shared.jobs.wait().await;
        self.shared.jobs.reopen();
    }

    /// Unwatch every root.
    pub async fn shutdown(&self) {
        let entries = self.shared.registry.drain().await;
        let count = entries.len();
        for entry in entries {
            entry.retire();
        }
        info!(target: "thumbwatch::engine", roots = count, "watcher shut down");
    }
}

/// Builder for [`ThumbWatcher`]; every collaborator has a default.
pub struct ThumbWatcherBuilder {
    prefs: ThumbnailPrefs,
    retry: RetryPolicy,
    policy: Arc<dyn ThumbnailPolicy>,
    codec: Arc<dyn ImageCodec>,
    backend: Arc<dyn WatchBackend>,
}

impl Default for ThumbWatcherBuilder {
    fn default() -> Self {
        Self {
            prefs: ThumbnailPrefs::default(),
            retry: RetryPolicy::default(),
            policy: Arc::new(DefaultPolicy),
            codec: Arc::new(ImageCrateCodec),
            backend: Arc::new(NotifyBackend::default()),
        }
    }
}

impl fmt::Debug for ThumbWatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThumbWatcherBuilder")
            .field("prefs", &self.prefs)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ThumbWatcherBuilder {
    pub fn prefs(mut self, prefs: ThumbnailPrefs) -> Self {
        self.prefs = prefs;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn policy(mut self, policy: impl ThumbnailPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn shared_policy(mut self, policy: Arc<dyn ThumbnailPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn codec(mut self, codec: impl ImageCodec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn shared_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn backend(mut self, backend: impl WatchBackend) -> Self {
        self.backend = Arc::new(backend);
        self
    }

    pub fn shared_backend(mut self, backend: Arc<dyn WatchBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn build(self) -> ThumbWatcher {
        ThumbWatcher {
            shared: Arc::new(EngineShared {
                registry: Registry::new(),
                policy: self.policy,
                codec: self.codec,
                backend: self.backend,
                prefs: RwLock::new(self.prefs),
                retry: self.retry,
                jobs: TaskTracker::new(),
                draining: Mutex::new(()),
            }),
        }
    }
}

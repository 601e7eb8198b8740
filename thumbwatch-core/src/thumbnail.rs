//! Single-thumbnail create/remove jobs.
//!
//! Each job runs as its own task and reports exactly one outcome (or none,
//! for a removal whose thumbnail never existed, or a creation whose source
//! was deleted before the thumbnail was saved). Jobs never wait on each
//! other and are not cancelled when their root goes away.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use tokio::task::spawn_blocking;
use tracing::{debug, trace};

use crate::codec::{ImageCodec, OpenError};
use crate::error::{Result, WatchError};
use crate::event::{EventEmitter, EventKind};
use crate::policy::ThumbnailPolicy;
use crate::prefs::{RetryPolicy, ThumbnailPrefs};

/// Everything one job needs, snapshotted when the job is spawned.
#[derive(Clone)]
pub(crate) struct ThumbnailJob {
    pub(crate) policy: Arc<dyn ThumbnailPolicy>,
    pub(crate) codec: Arc<dyn ImageCodec>,
    pub(crate) prefs: ThumbnailPrefs,
    pub(crate) retry: RetryPolicy,
    pub(crate) emitter: EventEmitter,
}

impl ThumbnailJob {
    pub(crate) async fn create(self, source: PathBuf) {
        match self.try_create(&source).await {
            Ok(thumb_path) => {
                if source_vanished(&source).await {
                    // A removal that ran before the save found nothing to delete.
                    self.discard(&source, thumb_path).await;
                    return;
                }
                debug!(target: "thumbwatch::thumbnail", source = %source.display(), thumb = %thumb_path.display(), "thumbnail created");
                self.emitter
                    .success(EventKind::ThumbnailCreated, thumb_path)
                    .await;
            }
            Err((path, err)) => {
                debug!(target: "thumbwatch::thumbnail", source = %source.display(), error = %err, "thumbnail creation failed");
                self.emitter.error(path, err).await;
            }
        }
    }

    /// Returns the thumbnail path, or the path to blame alongside the error.
    async fn try_create(&self, source: &Path) -> std::result::Result<PathBuf, (PathBuf, WatchError)> {
        let image = open_when_ready(&self.codec, source, self.retry)
            .await
            .map_err(|err| (source.to_path_buf(), err))?;

        let thumb_dir = self.policy.thumb_dir(source);
        ensure_dir(&thumb_dir, self.prefs.dir_mode())
            .await
            .map_err(|err| (thumb_dir.clone(), err))?;

        let thumb_path = thumb_dir.join(self.policy.thumb_name(source));
        let (width, height) = self.prefs.size();
        let algorithm = self.prefs.algorithm();
        let codec = Arc::clone(&self.codec);
        let target = thumb_path.clone();

        spawn_blocking(move || {
            let thumb = codec.resample(image, width, height, algorithm);
            codec.save(&thumb, &target).map_err(|err| WatchError::ImageSave {
                path: target.clone(),
                reason: err.to_string(),
            })
        })
        .await
        .map_err(|err| {
            (
                thumb_path.clone(),
                WatchError::Internal(format!("thumbnail task panicked: {err}")),
            )
        })?
        .map_err(|err| (thumb_path.clone(), err))?;

        Ok(thumb_path)
    }

    /// Delete a thumbnail whose source disappeared while it was being made.
    async fn discard(&self, source: &Path, thumb_path: PathBuf) {
        match tokio::fs::remove_file(&thumb_path).await {
            Ok(()) => {
                debug!(target: "thumbwatch::thumbnail", source = %source.display(), thumb = %thumb_path.display(), "source deleted during creation, thumbnail discarded");
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                self.emitter
                    .error(thumb_path.clone(), WatchError::io(&thumb_path, err))
                    .await;
            }
        }
    }

    pub(crate) async fn remove(self, source: PathBuf) {
        let thumb_path = self.policy.thumb_path(&source);
        match tokio::fs::remove_file(&thumb_path).await {
            Ok(()) => {
                debug!(target: "thumbwatch::thumbnail", source = %source.display(), thumb = %thumb_path.display(), "thumbnail removed");
                self.emitter
                    .success(EventKind::ThumbnailRemoved, thumb_path)
                    .await;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                trace!(target: "thumbwatch::thumbnail", thumb = %thumb_path.display(), "no thumbnail to remove");
            }
            Err(err) => {
                self.emitter
                    .error(thumb_path.clone(), WatchError::io(&thumb_path, err))
                    .await;
            }
        }
    }
}

async fn source_vanished(source: &Path) -> bool {
    matches!(tokio::fs::try_exists(source).await, Ok(false))
}

/// Open `path`, treating "unrecognized format" as a file that is still being
/// written. See [`RetryPolicy`] for the backoff curve.
pub(crate) async fn open_when_ready(
    codec: &Arc<dyn ImageCodec>,
    path: &Path,
    retry: RetryPolicy,
) -> Result<DynamicImage> {
    let mut attempts: u32 = 0;
    let mut waited = Duration::ZERO;

    loop {
        attempts += 1;
        let codec = Arc::clone(codec);
        let target = path.to_path_buf();
        let outcome = spawn_blocking(move || codec.open(&target))
            .await
            .map_err(|err| WatchError::Internal(format!("image open task panicked: {err}")))?;

        match outcome {
            Ok(image) => return Ok(image),
            Err(OpenError::Unrecognized(reason)) if retry.allows_retry_after(waited) => {
                let delay = retry.delay_for(attempts);
                trace!(
                    target: "thumbwatch::thumbnail",
                    path = %path.display(),
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    %reason,
                    "image not ready, backing off"
                );
                tokio::time::sleep(delay).await;
                waited += delay;
            }
            Err(OpenError::Unrecognized(reason)) => {
                return Err(WatchError::ImageFormat {
                    path: path.to_path_buf(),
                    attempts,
                    reason,
                });
            }
            Err(OpenError::Other(reason)) => {
                return Err(WatchError::ImageOpen {
                    path: path.to_path_buf(),
                    reason,
                });
            }
        }
    }
}

/// Create `dir` (and parents) with `mode` unless it already exists.
pub(crate) async fn ensure_dir(dir: &Path, mode: u32) -> Result<()> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(WatchError::io(
                dir,
                io::Error::new(io::ErrorKind::AlreadyExists, "not a directory"),
            ));
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(WatchError::io(dir, err)),
    }

    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    builder
        .create(dir)
        .await
        .map_err(|err| WatchError::io(dir, err))
}

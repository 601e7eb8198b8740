use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("root is already watched: {}", .0.display())]
    RootAlreadyWatched(PathBuf),

    #[error("root is not watched: {}", .0.display())]
    RootNotWatched(PathBuf),

    #[error("subdirectory is already watched: {}", .0.display())]
    SubdirAlreadyWatched(PathBuf),

    #[error("subdirectory is not watched: {}", .0.display())]
    SubdirNotWatched(PathBuf),

    #[error("failed to subscribe to {}: {reason}", path.display())]
    Subscribe { path: PathBuf, reason: String },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unrecognized image format at {} after {attempts} attempt(s): {reason}", path.display())]
    ImageFormat {
        path: PathBuf,
        attempts: u32,
        reason: String,
    },

    #[error("failed to open image {}: {reason}", path.display())]
    ImageOpen { path: PathBuf, reason: String },

    #[error("failed to save thumbnail {}: {reason}", path.display())]
    ImageSave { path: PathBuf, reason: String },

    #[error("notification source error: {0}")]
    Source(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WatchError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn subscribe(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::Subscribe {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// True for the registry contract violations that callers get back
    /// synchronously.
    pub fn is_registry_violation(&self) -> bool {
        matches!(
            self,
            Self::RootAlreadyWatched(_)
                | Self::RootNotWatched(_)
                | Self::SubdirAlreadyWatched(_)
                | Self::SubdirNotWatched(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;

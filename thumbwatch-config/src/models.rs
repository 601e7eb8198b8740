use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use thumbwatch_core::policy::{DEFAULT_THUMB_DIR_NAME, default_image_extensions};
use thumbwatch_core::prefs::{
    DEFAULT_THUMB_DIR_MODE, DEFAULT_THUMB_HEIGHT, DEFAULT_THUMB_WIDTH,
};
use thumbwatch_core::{MirrorPolicy, ResampleAlgorithm, RetryPolicy, ThumbnailPrefs};

/// Top-level daemon settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThumbwatchConfig {
    /// Gallery roots registered at startup.
    pub roots: Vec<PathBuf>,
    /// Capacity of each root's event channel. A slow consumer applies
    /// backpressure to that root's dispatcher and jobs once it fills.
    pub event_buffer: usize,
    pub thumbnail: ThumbnailConfig,
    pub retry: RetryConfig,
    pub layout: LayoutConfig,
}

impl Default for ThumbwatchConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            event_buffer: 256,
            thumbnail: ThumbnailConfig::default(),
            retry: RetryConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

/// Output size, filter and directory permissions for generated thumbnails.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,
    pub algorithm: ResampleAlgorithm,
    /// Permission bits for newly created thumbnail directories. Accepts an
    /// integer (`493`) or an octal string (`"0o755"`, `"755"`).
    #[serde(with = "octal_mode")]
    pub dir_mode: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_THUMB_WIDTH,
            height: DEFAULT_THUMB_HEIGHT,
            algorithm: ResampleAlgorithm::default(),
            dir_mode: DEFAULT_THUMB_DIR_MODE,
        }
    }
}

/// Backoff used while a new file is not yet a readable image.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// The Nth retry waits N times this many milliseconds.
    pub step_ms: u64,
    /// Give up once the total backoff would exceed this many milliseconds.
    pub budget_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            step_ms: retry.step().as_millis() as u64,
            budget_ms: retry.budget().as_millis() as u64,
        }
    }
}

/// Where thumbnails go and which entries are considered.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub thumb_dir_name: String,
    pub extensions: Vec<String>,
    /// Deepest watched subdirectory level, 0 meaning direct children of a root.
    pub max_depth: usize,
    pub skip_hidden: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            thumb_dir_name: DEFAULT_THUMB_DIR_NAME.to_string(),
            extensions: default_image_extensions(),
            max_depth: 0,
            skip_hidden: true,
        }
    }
}

impl ThumbwatchConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.event_buffer == 0 {
            bail!("event_buffer must be at least 1");
        }
        if self.retry.step_ms == 0 {
            bail!("retry.step_ms must be greater than zero");
        }
        if self.thumbnail.dir_mode > 0o7777 {
            bail!(
                "thumbnail.dir_mode {:o} is not a permission mode",
                self.thumbnail.dir_mode
            );
        }
        let name = self.layout.thumb_dir_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            bail!(
                "layout.thumb_dir_name {:?} must be a single directory name",
                self.layout.thumb_dir_name
            );
        }
        if self.layout.extensions.is_empty() {
            bail!("layout.extensions must list at least one extension");
        }
        Ok(())
    }

    pub fn thumbnail_prefs(&self) -> ThumbnailPrefs {
        ThumbnailPrefs::new(self.thumbnail.width, self.thumbnail.height)
            .with_algorithm(self.thumbnail.algorithm)
            .with_dir_mode(self.thumbnail.dir_mode)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry.step_ms),
            Duration::from_millis(self.retry.budget_ms),
        )
    }

    pub fn layout_policy(&self) -> MirrorPolicy {
        MirrorPolicy::new(self.layout.thumb_dir_name.clone())
            .with_extensions(&self.layout.extensions)
            .with_max_depth(self.layout.max_depth)
            .with_skip_hidden(self.layout.skip_hidden)
    }
}

mod octal_mode {
    use serde::de::{self, Deserializer};
    use serde::{Deserialize, Serializer};

    pub fn serialize<S: Serializer>(mode: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0o{mode:o}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(mode) => Ok(mode),
            Raw::Text(text) => {
                let digits = text.trim();
                let digits = digits
                    .strip_prefix("0o")
                    .or_else(|| digits.strip_prefix("0O"))
                    .unwrap_or(digits);
                u32::from_str_radix(digits, 8)
                    .map_err(|_| de::Error::custom(format!("invalid octal mode {text:?}")))
            }
        }
    }
}

//! Thumbnail preferences and the retry policy used while a freshly created
//! source file is still being written.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_THUMB_WIDTH: u32 = 128;
pub const DEFAULT_THUMB_HEIGHT: u32 = 128;
pub const DEFAULT_THUMB_DIR_MODE: u32 = 0o777;

/// Resampling filter used when shrinking a source image.
///
/// The engine never interprets this value; it is handed to the
/// [`ImageCodec`](crate::codec::ImageCodec) unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleAlgorithm {
    #[default]
    NearestNeighbor,
    Box,
    Linear,
    Hermite,
    MitchellNetravali,
    CatmullRom,
    BSpline,
    Gaussian,
    Bartlett,
    Lanczos,
    Hann,
    Hamming,
    Blackman,
    Welch,
    Cosine,
}

impl ResampleAlgorithm {
    pub const ALL: [ResampleAlgorithm; 15] = [
        Self::NearestNeighbor,
        Self::Box,
        Self::Linear,
        Self::Hermite,
        Self::MitchellNetravali,
        Self::CatmullRom,
        Self::BSpline,
        Self::Gaussian,
        Self::Bartlett,
        Self::Lanczos,
        Self::Hann,
        Self::Hamming,
        Self::Blackman,
        Self::Welch,
        Self::Cosine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NearestNeighbor => "nearest_neighbor",
            Self::Box => "box",
            Self::Linear => "linear",
            Self::Hermite => "hermite",
            Self::MitchellNetravali => "mitchell_netravali",
            Self::CatmullRom => "catmull_rom",
            Self::BSpline => "b_spline",
            Self::Gaussian => "gaussian",
            Self::Bartlett => "bartlett",
            Self::Lanczos => "lanczos",
            Self::Hann => "hann",
            Self::Hamming => "hamming",
            Self::Blackman => "blackman",
            Self::Welch => "welch",
            Self::Cosine => "cosine",
        }
    }
}

impl fmt::Display for ResampleAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-wide thumbnail settings. Dimensions are clamped to at least 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThumbnailPrefs {
    width: u32,
    height: u32,
    algorithm: ResampleAlgorithm,
    dir_mode: u32,
}

impl Default for ThumbnailPrefs {
    fn default() -> Self {
        Self {
            width: DEFAULT_THUMB_WIDTH,
            height: DEFAULT_THUMB_HEIGHT,
            algorithm: ResampleAlgorithm::NearestNeighbor,
            dir_mode: DEFAULT_THUMB_DIR_MODE,
        }
    }
}

impl ThumbnailPrefs {
    pub fn new(width: u32, height: u32) -> Self {
        let mut prefs = Self::default();
        prefs.set_size(width, height);
        prefs
    }

    pub fn with_algorithm(mut self, algorithm: ResampleAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    pub fn algorithm(&self) -> ResampleAlgorithm {
        self.algorithm
    }

    pub fn set_algorithm(&mut self, algorithm: ResampleAlgorithm) {
        self.algorithm = algorithm;
    }

    /// Permission bits used when creating a thumbnail directory.
    pub fn dir_mode(&self) -> u32 {
        self.dir_mode
    }

    pub fn set_dir_mode(&mut self, mode: u32) {
        self.dir_mode = mode;
    }
}

/// Smallest backoff step; shorter steps are raised to this.
pub const MIN_RETRY_STEP: Duration = Duration::from_millis(1);

/// Linear backoff for "unrecognized format" failures: the Nth retry waits
/// `N * step`, and retrying stops once the cumulative wait exceeds `budget`.
///
/// The step is never zero, so every policy gives up after a finite number
/// of attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    step: Duration,
    budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(2),
            budget: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(step: Duration, budget: Duration) -> Self {
        Self {
            step: step.max(MIN_RETRY_STEP),
            budget,
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Delay before the given retry (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.step.saturating_mul(retry)
    }

    /// Whether another retry is allowed after `waited` of cumulative backoff.
    pub fn allows_retry_after(&self, waited: Duration) -> bool {
        waited <= self.budget
    }

    /// Total attempts (initial open included) made before giving up when
    /// every attempt fails as unrecognized.
    pub fn max_attempts(&self) -> u32 {
        let mut waited = Duration::ZERO;
        let mut attempts = 1;
        while self.allows_retry_after(waited) {
            waited += self.delay_for(attempts);
            attempts += 1;
        }
        attempts
    }
}

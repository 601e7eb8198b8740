//! Configuration for the thumbwatch daemon.
//!
//! Settings are read from a TOML or JSON file (or inline JSON from the
//! environment) and turned into the engine's preferences, retry tuning and
//! gallery layout policy. The `thumbwatch` binary in this crate wires them
//! together with logging.

pub mod loader;
pub mod models;

pub use loader::ConfigSource;
pub use models::{LayoutConfig, RetryConfig, ThumbnailConfig, ThumbwatchConfig};

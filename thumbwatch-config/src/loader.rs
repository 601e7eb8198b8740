use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};

use crate::models::ThumbwatchConfig;

pub const CONFIG_PATH_ENV: &str = "THUMBWATCH_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "THUMBWATCH_CONFIG_JSON";

const DEFAULT_CANDIDATES: &[&str] = &[
    "thumbwatch.toml",
    "thumbwatch.json",
    "config/thumbwatch.toml",
    "config/thumbwatch.json",
];

/// Source that produced the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
    /// Given explicitly, e.g. with `--config`.
    Explicit(PathBuf),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Default => f.write_str("built-in defaults"),
            ConfigSource::EnvPath(path) => write!(f, "${CONFIG_PATH_ENV} ({})", path.display()),
            ConfigSource::EnvInline => write!(f, "${CONFIG_JSON_ENV}"),
            ConfigSource::File(path) | ConfigSource::Explicit(path) => {
                write!(f, "{}", path.display())
            }
        }
    }
}

impl ThumbwatchConfig {
    /// Load configuration using environment variables.
    /// Evaluation order:
    /// 1) `$THUMBWATCH_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$THUMBWATCH_CONFIG_JSON` (inline JSON),
    /// 3) the first default file found in the working directory,
    /// 4) defaults.
    ///
    /// Whatever is found is validated before it is returned.
    pub fn load_from_env() -> anyhow::Result<(Self, ConfigSource)> {
        Self::load_from_env_in(Path::new("."))
    }

    /// Same as [`load_from_env`](Self::load_from_env) with default files
    /// looked up relative to `base`.
    pub fn load_from_env_in(base: &Path) -> anyhow::Result<(Self, ConfigSource)> {
        let (config, source) = Self::locate(base)?;
        config
            .validate()
            .with_context(|| format!("invalid configuration from {source}"))?;
        Ok((config, source))
    }

    /// Read and validate a TOML or JSON file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let config = Self::read_file(path)?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    fn locate(base: &Path) -> anyhow::Result<(Self, ConfigSource)> {
        if let Ok(path_str) = env::var(CONFIG_PATH_ENV)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::read_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var(CONFIG_JSON_ENV)
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_ENV}"))?;
            return Ok((parsed, ConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file(base) {
            let config = Self::read_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((Self::default(), ConfigSource::Default))
    }

    fn read_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents)
                .with_context(|| format!("invalid config {}", path.display())),
            Some("toml") | Some("tml") => toml::from_str(&contents)
                .map_err(|err| anyhow!("invalid config {}: {}", path.display(), err)),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        // TOML first, then JSON.
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).map_err(|err| anyhow!("invalid config json: {err}"))
    }

    fn find_default_file(base: &Path) -> Option<PathBuf> {
        DEFAULT_CANDIDATES
            .iter()
            .map(|candidate| base.join(candidate))
            .find(|path| path.is_file())
    }
}

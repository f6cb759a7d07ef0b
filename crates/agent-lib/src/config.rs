//! Agent configuration
//!
//! Settings are loaded once at process start from a JSON document and
//! validated as a whole before anything else runs. They are immutable for
//! the lifetime of the process; reloading between cycles is a known
//! limitation, not a feature.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use url::Url;

use crate::cadence::CadenceError;

/// Cadence token applied when the `config` section omits one.
pub const DEFAULT_INTERVAL: &str = "12h";

/// Default measurement service base URL.
pub const DEFAULT_ENDPOINT: &str = "https://www.speedtest.net";

fn default_workers() -> usize {
    2
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Errors raised while loading or validating the configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file is missing.
    #[error("configuration file {} does not exist", .0.display())]
    NotFound(PathBuf),

    /// The document could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The document parsed but a value is unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The cadence token could not be parsed.
    #[error(transparent)]
    Cadence(#[from] CadenceError),
}

/// Storage sink settings (`database` section).
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// InfluxDB host name or address.
    pub server: String,
    /// InfluxDB HTTP API port.
    pub port: u16,
    pub user: String,
    /// Legacy documents use the `pwd` key.
    #[serde(alias = "pwd")]
    pub password: String,
    /// Target database, created on first write when absent.
    pub name: String,
}

impl DatabaseConfig {
    /// HTTP endpoint of the storage sink.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.server, self.port)
    }
}

/// Measurement settings (`speedtest` section).
#[derive(Debug, Clone, Deserialize)]
pub struct SpeedtestConfig {
    /// Preferred server ids, matched before any other server is considered.
    /// Whitespace-separated in the document.
    #[serde(default, deserialize_with = "de_server_ids")]
    pub pref_servers: Vec<u64>,

    /// Fall back to the full server list when no preferred server matches.
    /// Off by default: an operator who pins servers wants failures surfaced.
    #[serde(default, deserialize_with = "de_flag")]
    pub any_server: bool,

    /// Concurrent workers for the download phase.
    #[serde(default = "default_workers")]
    pub download_workers: usize,

    /// Concurrent workers for the upload phase.
    #[serde(default = "default_workers")]
    pub upload_workers: usize,

    /// Measurement service base URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

/// Collector settings (`config` section).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    /// Cadence token, e.g. `"12h"`.
    #[serde(default)]
    pub interval: String,
}

impl RunConfig {
    /// The cadence token, with the documented default for absent or empty
    /// values.
    pub fn cadence_token(&self) -> &str {
        if self.interval.trim().is_empty() {
            DEFAULT_INTERVAL
        } else {
            &self.interval
        }
    }
}

/// Validated, immutable settings for one agent run.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub speedtest: SpeedtestConfig,
    #[serde(default)]
    pub config: RunConfig,
}

impl Settings {
    /// Load and validate settings from a JSON document.
    ///
    /// Validation is all-or-nothing: no partially usable settings are ever
    /// returned.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let raw = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json))
            .build()?;
        let settings: Settings = raw.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("database.server", &self.database.server),
            ("database.user", &self.database.user),
            ("database.password", &self.database.password),
            ("database.name", &self.database.name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{key} must not be empty")));
            }
        }
        if self.database.port == 0 {
            return Err(ConfigError::Invalid(
                "database.port must not be zero".to_string(),
            ));
        }
        if self.speedtest.download_workers == 0 || self.speedtest.upload_workers == 0 {
            return Err(ConfigError::Invalid(
                "speedtest worker counts must be positive".to_string(),
            ));
        }
        Url::parse(&self.speedtest.endpoint).map_err(|e| {
            ConfigError::Invalid(format!("speedtest.endpoint is not a valid URL: {e}"))
        })?;
        Ok(())
    }
}

fn de_server_ids<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.split_whitespace()
        .map(|tok| {
            tok.parse::<u64>()
                .map_err(|_| serde::de::Error::custom(format!("invalid server id {tok:?}")))
        })
        .collect()
}

fn de_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Text(text) => match text.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "" | "false" | "no" | "0" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "invalid flag value {other:?}"
            ))),
        },
    }
}

//! Explicit core configuration.
//!
//! # Responsibility
//! - Hold every process-level setting the core needs in one value.
//! - Parse TOML configuration files with defaults for absent keys.
//!
//! # Invariants
//! - A `CoreConfig` is built once at startup and passed by reference into
//!   the mutation service, query service and counter engine.
//! - `validate()` succeeds for every value returned by `load`/`from_toml_str`.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DATABASE_FILE: &str = "quotebase.sqlite3";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CONTENT_LANGUAGE: &str = "en";

/// Configuration loading/validation error.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config syntax: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

/// Core settings shared by storage, query and mutation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// SQLite database file used by `open_db` callers.
    pub database_path: PathBuf,
    /// Maximum wait for a store lock before a write is reported as failed.
    pub busy_timeout_ms: u64,
    /// Language tag every stored quote is considered to be written in.
    pub content_language: String,
    /// Re-counts each touched counter row after a mutation and fails the
    /// mutation on mismatch.
    pub verify_counters_on_write: bool,
    /// `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Absolute directory for rolling log files. Logging stays off when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            content_language: DEFAULT_CONTENT_LANGUAGE.to_string(),
            verify_counters_on_write: false,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl CoreConfig {
    /// Parses and validates TOML text. Absent keys take default values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.content_language.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "content_language must not be blank".to_string(),
            ));
        }
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "database_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Returns whether `tag` names the single language all content is in.
    pub fn is_content_language(&self, tag: &str) -> bool {
        tag.trim()
            .eq_ignore_ascii_case(self.content_language.trim())
    }
}

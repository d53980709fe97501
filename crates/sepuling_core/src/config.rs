//! Storage configuration.
//!
//! # Responsibility
//! - Describe which storage backend to run and where its database lives.
//! - Load that description from TOML with environment overrides on top.
//!
//! # Invariants
//! - Backend selection happens once, at process startup.
//! - Unknown backend names are rejected, never defaulted.

use crate::db::IN_MEMORY_DATABASE;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const BACKEND_ENV: &str = "SEPULING_BACKEND";
pub const DATABASE_ENV: &str = "SEPULING_DATABASE";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    InvalidValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::InvalidValue { key, value } => {
                write!(f, "invalid value `{value}` for `{key}`")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

/// Storage port implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Hand-written statements over rusqlite.
    #[default]
    Sql,
    /// Diesel query builder.
    Orm,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Orm => "orm",
        }
    }
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sql" => Ok(Self::Sql),
            "orm" => Ok(Self::Orm),
            _ => Err(ConfigError::InvalidValue {
                key: "backend",
                value: value.to_string(),
            }),
        }
    }
}

/// Top-level storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// SQLite file path, or `:memory:`.
    #[serde(default = "default_database")]
    pub database: String,
    /// Optional log level forwarded to `init_logging`.
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database: default_database(),
            log_level: None,
        }
    }
}

fn default_database() -> String {
    IN_MEMORY_DATABASE.to_string()
}

impl StorageConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Applies `SEPULING_BACKEND` / `SEPULING_DATABASE` from `lookup`.
    ///
    /// Pass `|key| std::env::var(key).ok()` in production.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(backend) = lookup(BACKEND_ENV) {
            self.backend = backend.parse()?;
        }
        if let Some(database) = lookup(DATABASE_ENV) {
            self.database = database;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == IN_MEMORY_DATABASE
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "database",
                value: self.database.clone(),
            });
        }
        Ok(())
    }
}

//! # Engine Configuration
//!
//! Configuration for the settlement engine: where the database lives, how
//! long writers wait for the lock, and how receipt URLs are built.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     TALLY_DB_PATH=/var/lib/tally/tally.db                               │
//! │     TALLY_DB_MAX_CONNECTIONS=8                                          │
//! │     TALLY_DB_BUSY_TIMEOUT_SECS=10                                       │
//! │     TALLY_RECEIPT_BASE_URL=https://shop.example.com                     │
//! │                                                                         │
//! │  2. TOML Config File (optional)                                         │
//! │     tally.toml                                                          │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! │     ./tally.db, 5 connections, 5s busy timeout, relative receipt URLs   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # tally.toml
//! [database]
//! path = "/var/lib/tally/tally.db"
//! max_connections = 8
//! busy_timeout_secs = 10
//!
//! [receipts]
//! base_url = "https://shop.example.com"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::pool::DbConfig;

/// Environment variable names.
pub const ENV_DB_PATH: &str = "TALLY_DB_PATH";
pub const ENV_DB_MAX_CONNECTIONS: &str = "TALLY_DB_MAX_CONNECTIONS";
pub const ENV_DB_BUSY_TIMEOUT_SECS: &str = "TALLY_DB_BUSY_TIMEOUT_SECS";
pub const ENV_RECEIPT_BASE_URL: &str = "TALLY_RECEIPT_BASE_URL";

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: impl ToString, reason: &str) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for the database lock before failing with
    /// a lock timeout.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tally.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

/// `[receipts]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptSettings {
    /// Prefix for receipt URLs. Empty means receipts are returned as
    /// relative paths (`/receipts/{uuid}`).
    #[serde(default)]
    pub base_url: String,
}

// =============================================================================
// Engine Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub receipts: ReceiptSettings,
}

impl EngineConfig {
    /// Loads configuration: optional file, then environment, then validation.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let config = EngineConfig::load(Some(Path::new("tally.toml")))?;
    /// let db = Database::new(config.db_config()).await?;
    /// ```
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => EngineConfig::default(),
        };

        config.apply_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;

        info!(
            db_path = %config.database.path.display(),
            max_connections = config.database.max_connections,
            busy_timeout_secs = config.database.busy_timeout_secs,
            "Engine configuration loaded"
        );

        Ok(config)
    }

    /// Reads and parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Reading config file");

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&content)
    }

    /// Parses TOML content. Missing sections and keys take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Applies `TALLY_*` overrides using the given lookup.
    ///
    /// `load` passes the process environment; tests pass a map.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH) {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(ENV_DB_MAX_CONNECTIONS) {
            self.database.max_connections = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(ENV_DB_MAX_CONNECTIONS, &raw, "expected an integer"))?;
        }

        if let Some(raw) = lookup(ENV_DB_BUSY_TIMEOUT_SECS) {
            self.database.busy_timeout_secs = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(ENV_DB_BUSY_TIMEOUT_SECS, &raw, "expected an integer"))?;
        }

        if let Some(url) = lookup(ENV_RECEIPT_BASE_URL) {
            self.receipts.base_url = url;
        }

        Ok(())
    }

    /// Rejects values the pool cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("database.path", "", "must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::invalid(
                "database.max_connections",
                0,
                "must be at least 1",
            ));
        }
        if self.database.busy_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "database.busy_timeout_secs",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Converts into the pool configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
            .receipt_base_url(self.receipts.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.database.path, PathBuf::from("tally.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.busy_timeout_secs, 5);
        assert!(config.receipts.base_url.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            [database]
            path = "/tmp/shop.db"

            [receipts]
            base_url = "https://shop.example.com/"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/shop.db"));
        assert_eq!(config.database.max_connections, 5);

        let db = config.db_config();
        assert_eq!(db.receipt_base_url, "https://shop.example.com");
        assert_eq!(db.busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_env_overrides_win() {
        let mut config =
            EngineConfig::from_toml_str("[database]\nmax_connections = 2\n").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DB_MAX_CONNECTIONS, "9"),
            (ENV_DB_BUSY_TIMEOUT_SECS, "12"),
            (ENV_DB_PATH, "/data/tally.db"),
        ]);

        config
            .apply_overrides_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database.max_connections, 9);
        assert_eq!(config.database.busy_timeout_secs, 12);
        assert_eq!(config.database.path, PathBuf::from("/data/tally.db"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides_from(|key| (key == ENV_DB_MAX_CONNECTIONS).then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        assert!(matches!(
            EngineConfig::from_toml_str("[database]\nmax_connections = \"x\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EngineConfig::from_file(Path::new("/nonexistent/tally.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

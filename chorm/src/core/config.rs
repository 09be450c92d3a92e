//! Connection configuration
//!
//! Settings come from an optional JSON file and `CHORM_*` environment
//! variables. Precedence: environment > file > defaults.
//!
//! ```json
//! {
//!   "clickhouse": {
//!     "url": "http://localhost:8123",
//!     "database": "analytics",
//!     "timeout_secs": 10
//!   }
//! }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::constants::{
    CLICKHOUSE_DEFAULT_COMPRESSION, CLICKHOUSE_DEFAULT_DATABASE, CLICKHOUSE_DEFAULT_TIMEOUT_SECS,
    CLICKHOUSE_DEFAULT_URL, ENV_CLICKHOUSE_COMPRESSION, ENV_CLICKHOUSE_DATABASE,
    ENV_CLICKHOUSE_PASSWORD, ENV_CLICKHOUSE_TIMEOUT_SECS, ENV_CLICKHOUSE_URL, ENV_CLICKHOUSE_USER,
    ENV_CONFIG,
};

/// Top-level layout of the JSON config file
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileConfig {
    pub clickhouse: Option<ClickhouseFileConfig>,
}

/// ClickHouse section of the config file
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ClickhouseFileConfig {
    /// HTTP URL (or use CHORM_CLICKHOUSE_URL)
    pub url: Option<String>,
    /// Database name (default: "default")
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Per-statement timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Enable LZ4 compression (default: true)
    pub compression: Option<bool>,
}

impl FileConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

/// Resolved ClickHouse connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickhouseConfig {
    pub url: String,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Per-statement timeout in seconds
    pub timeout_secs: u64,
    /// Enable LZ4 compression for requests and responses
    pub compression: bool,
}

impl Default for ClickhouseConfig {
    fn default() -> Self {
        Self {
            url: CLICKHOUSE_DEFAULT_URL.to_string(),
            database: CLICKHOUSE_DEFAULT_DATABASE.to_string(),
            user: None,
            password: None,
            timeout_secs: CLICKHOUSE_DEFAULT_TIMEOUT_SECS,
            compression: CLICKHOUSE_DEFAULT_COMPRESSION,
        }
    }
}

impl ClickhouseConfig {
    /// Load from the process environment, reading the file named by `CHORM_CONFIG` if set
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG).ok();
        Self::load_with(path.as_deref().map(Path::new), |key| std::env::var(key).ok())
    }

    /// Load from an explicit file (if any) and an environment lookup function
    pub fn load_with<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match path {
            Some(path) => FileConfig::load_from_file(path)?,
            None => FileConfig::default(),
        };
        let config = Self::resolve(file.clickhouse.unwrap_or_default(), env)?;
        config.validate()?;
        tracing::debug!(
            url = %config.url,
            database = %config.database,
            timeout_secs = config.timeout_secs,
            compression = config.compression,
            "Resolved ClickHouse config"
        );
        Ok(config)
    }

    /// Merge file settings with environment overrides and defaults
    pub fn resolve<F>(file: ClickhouseFileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let url = pick(ENV_CLICKHOUSE_URL, &env, file.url, "url").unwrap_or(defaults.url);
        let database = pick(ENV_CLICKHOUSE_DATABASE, &env, file.database, "database")
            .unwrap_or(defaults.database);
        let user = pick(ENV_CLICKHOUSE_USER, &env, file.user, "user");
        let password = pick(ENV_CLICKHOUSE_PASSWORD, &env, file.password, "password");

        let timeout_secs = match env(ENV_CLICKHOUSE_TIMEOUT_SECS) {
            Some(raw) => raw.trim().parse::<u64>().with_context(|| {
                format!("Invalid {}: {}", ENV_CLICKHOUSE_TIMEOUT_SECS, raw)
            })?,
            None => file.timeout_secs.unwrap_or(defaults.timeout_secs),
        };
        let compression = match env(ENV_CLICKHOUSE_COMPRESSION) {
            Some(raw) => parse_bool(&raw)
                .with_context(|| format!("Invalid {}: {}", ENV_CLICKHOUSE_COMPRESSION, raw))?,
            None => file.compression.unwrap_or(defaults.compression),
        };

        Ok(Self {
            url,
            database,
            user,
            password,
            timeout_secs,
            compression,
        })
    }

    /// Validate resolved settings
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            anyhow::bail!(
                "Configuration error: clickhouse.url must not be empty. \
                 Set via {} env var or clickhouse.url in config file.",
                ENV_CLICKHOUSE_URL
            );
        }
        if self.database.trim().is_empty() {
            anyhow::bail!("Configuration error: clickhouse.database must not be empty");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("Configuration error: clickhouse.timeout_secs must be greater than 0");
        }
        Ok(())
    }
}

/// Environment value if set, otherwise the file value
fn pick<F>(key: &str, env: &F, file_value: Option<String>, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(value) => {
            tracing::trace!(key, "Using environment override for clickhouse.{}", name);
            Some(value)
        }
        None => file_value,
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {:?}", other),
    }
}

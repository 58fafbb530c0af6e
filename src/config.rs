//! Configuration management
//!
//! TOML configuration with serde defaults and environment variable
//! overrides. Configuration selects the dialect adapter and the default
//! reporting options; it never inspects a live database connection.

use crate::dialect::{self, DialectAdapter};
use crate::error::{Error, Result};
use crate::report::ReportOptions;
use crate::types::Grouping;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Reporting defaults
    #[serde(default)]
    pub reporting: ReportingConfig,

    /// Cache behavior
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Reporting defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportingConfig {
    /// Dialect adapter identifier: `memory`, `postgres` or `sqlite`
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Default number of buckets per report
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Default bucket granularity
    #[serde(default = "default_grouping")]
    pub default_grouping: String,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
            default_limit: default_limit(),
            default_grouping: default_grouping(),
        }
    }
}

/// Cache behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Whether unconditioned reports are cacheable by default
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

fn default_dialect() -> String {
    "memory".to_string()
}

fn default_limit() -> usize {
    100
}

fn default_grouping() -> String {
    "day".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {path}: {e}"))
        })?;
        toml::from_str(&contents)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file {path}: {e}")))
    }

    /// Load configuration from a file with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `TRENDLINE_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dialect) = std::env::var("TRENDLINE_DIALECT") {
            self.reporting.dialect = dialect;
        }
        if let Ok(limit) = std::env::var("TRENDLINE_DEFAULT_LIMIT") {
            if let Ok(parsed) = limit.parse() {
                self.reporting.default_limit = parsed;
            }
        }
        if let Ok(grouping) = std::env::var("TRENDLINE_DEFAULT_GROUPING") {
            self.reporting.default_grouping = grouping;
        }
        if let Ok(enabled) = std::env::var("TRENDLINE_CACHE_ENABLED") {
            if let Ok(parsed) = enabled.parse() {
                self.cache.enabled = parsed;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        dialect::from_identifier(&self.reporting.dialect)?;
        Grouping::from_identifier(&self.reporting.default_grouping)?;
        if self.reporting.default_limit == 0 {
            return Err(Error::Configuration(
                "default_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Construct the configured dialect adapter
    pub fn dialect(&self) -> Result<Arc<dyn DialectAdapter>> {
        Ok(dialect::from_identifier(&self.reporting.dialect)?)
    }

    /// The configured default report options
    pub fn default_options(&self) -> Result<ReportOptions> {
        Ok(ReportOptions {
            grouping: Grouping::from_identifier(&self.reporting.default_grouping)?,
            limit: self.reporting.default_limit,
            cacheable: self.cache.enabled,
            ..ReportOptions::default()
        })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, contents)
            .map_err(|e| Error::Configuration(format!("Failed to write config file {path}: {e}")))
    }
}

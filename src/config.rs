//! Scatter configuration
//!
//! Loads `.env` (if present) and then `SCATTER_*` environment variables.

use crate::error::ScatterError;
use serde::Deserialize;

/// Thirty days in milliseconds
pub const DEFAULT_PERIOD_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Scatter configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScatterConfig {
    /// `tracing` level directive for this crate
    pub log_level: String,

    /// Prefix of every shard database name
    pub db_prefix: String,

    /// Number of key buckets per time period
    pub buckets: u32,

    /// Width of one time period in milliseconds
    pub period_ms: i64,

    /// Default row limit for queries, unbounded when unset
    pub query_limit: Option<usize>,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            db_prefix: "scatter".to_string(),
            buckets: 4,
            period_ms: DEFAULT_PERIOD_MS,
            query_limit: None,
        }
    }
}

impl ScatterConfig {
    /// Read `.env` and the `SCATTER_*` environment
    pub fn from_env() -> Result<Self, ScatterError> {
        dotenvy::dotenv().ok();
        Self::from_source(config::Environment::with_prefix("SCATTER").try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self, ScatterError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config: Self = config::Config::builder()
            .add_source(source)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ScatterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ScatterError> {
        if self.buckets == 0 {
            return Err(ScatterError::Config(
                "SCATTER_BUCKETS must be greater than zero".to_string(),
            ));
        }
        if self.period_ms <= 0 {
            return Err(ScatterError::Config(
                "SCATTER_PERIOD_MS must be a positive number of milliseconds".to_string(),
            ));
        }
        Ok(())
    }
}

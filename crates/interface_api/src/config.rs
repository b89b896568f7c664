//! API configuration

use serde::Deserialize;

use core_kernel::Precision;
use domain_closing::{
    ClosingPolicy, DimensionSet, DispatchMode, EngineConfig, DEFAULT_BATCH_SIZE, DEFAULT_WORKER_COUNT,
};

/// API configuration
///
/// Every field can be set through a `CLOSING_`-prefixed environment
/// variable, e.g. `CLOSING_BATCH_SIZE=25` or `CLOSING_DIMENSIONS=region,channel`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL
    pub database_url: String,
    /// Log level
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    /// Units of one run in flight at once
    pub batch_size: usize,
    /// Worker tasks consuming the job queue
    pub worker_count: usize,
    /// Deliveries of a unit before a transient failure is given up on
    pub max_deliveries: u32,
    /// Process units on the worker pool; when false they run inline
    pub background: bool,
    /// When false, runs are accepted but nothing is claimed
    pub scheduler_active: bool,
    /// Decimal places of posted amounts
    pub amount_precision: u32,
    /// Accounting dimensions beyond the standard ones
    pub dimensions: Vec<String>,
    /// Policy used when a create request names none
    pub default_policy: ClosingPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/closing".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            batch_size: DEFAULT_BATCH_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            max_deliveries: 3,
            background: true,
            scheduler_active: true,
            amount_precision: core_kernel::amount::DEFAULT_PRECISION,
            dimensions: Vec::new(),
            default_policy: ClosingPolicy::default(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("CLOSING")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("dimensions"),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the closing engine settings
    pub fn engine_config(&self) -> Result<EngineConfig, config::ConfigError> {
        if self.batch_size < 1 {
            return Err(config::ConfigError::Message(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.worker_count < 1 {
            return Err(config::ConfigError::Message(
                "worker_count must be at least 1".to_string(),
            ));
        }
        let precision = Precision::new(self.amount_precision)
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        let dimensions = DimensionSet::with_custom(self.dimensions.iter().map(String::as_str))
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;

        Ok(EngineConfig {
            batch_size: self.batch_size,
            worker_count: self.worker_count,
            max_deliveries: self.max_deliveries,
            dispatch: if self.background {
                DispatchMode::Background
            } else {
                DispatchMode::Inline
            },
            scheduler_active: self.scheduler_active,
            precision,
            dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.default_policy, ClosingPolicy::Dual);

        let engine = config.engine_config().unwrap();
        assert_eq!(engine.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(engine.dispatch, DispatchMode::Background);
        assert_eq!(engine.dimensions, DimensionSet::standard());
    }

    #[test]
    fn test_custom_dimensions_extend_standard_set() {
        let config = ApiConfig {
            dimensions: vec!["region".to_string()],
            background: false,
            ..ApiConfig::default()
        };
        let engine = config.engine_config().unwrap();
        assert_eq!(engine.dimensions.len(), 4);
        assert_eq!(engine.dispatch, DispatchMode::Inline);
    }

    #[test]
    fn test_invalid_precision_is_rejected() {
        let config = ApiConfig {
            amount_precision: 40,
            ..ApiConfig::default()
        };
        assert!(config.engine_config().is_err());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let config = ApiConfig {
            batch_size: 0,
            ..ApiConfig::default()
        };
        assert!(config.engine_config().is_err());

        let config = ApiConfig {
            worker_count: 0,
            ..ApiConfig::default()
        };
        assert!(config.engine_config().is_err());
    }
}

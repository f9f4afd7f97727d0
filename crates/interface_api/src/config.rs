//! Application configuration
//!
//! Values come from `COMMISSION_*` environment variables layered over the
//! serde defaults. Nested keys use a double underscore:
//!
//! ```text
//! COMMISSION_SERVER__PORT=8080
//! COMMISSION_DATABASE__URL=postgres://localhost/commission
//! COMMISSION_SETTLEMENT__WORKER_COUNT=8
//! COMMISSION_SETTLEMENT__RETRY_DELAYS_MS=100,500,2000
//! COMMISSION_SETTLEMENT__PROCESSING_LEASE_SECS=600
//! COMMISSION_LOG_JSON=true
//! ```
//!
//! Loading fails when the settlement section is out of range, e.g. an
//! upline depth beyond the commission tiers.

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use domain_settlement::SettlementConfig;
use infra_db::DatabaseConfig;

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Top-level configuration of the API server
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub settlement: SettlementConfig,
    /// Filter used when `RUST_LOG` is not set
    pub log_level: String,
    /// Emit logs as JSON lines instead of the human-readable format
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            settlement: SettlementConfig::default(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_environment(Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix("COMMISSION")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("settlement.retry_delays_ms")
    }

    fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        config
            .settlement
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use std::time::Duration;

    fn try_load_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<config::Map<String, String>>();
        AppConfig::from_environment(AppConfig::environment().source(Some(map)))
    }

    fn load_from(vars: &[(&str, &str)]) -> AppConfig {
        try_load_from(vars).unwrap()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = load_from(&[]);
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.settlement.worker_count, 4);
        assert_eq!(config.settlement.currency, Currency::MYR);
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
    }

    #[test]
    fn test_nested_overrides() {
        let config = load_from(&[
            ("COMMISSION_SERVER__PORT", "9090"),
            ("COMMISSION_DATABASE__URL", "postgres://db/commission"),
            ("COMMISSION_DATABASE__LOCK_TIMEOUT", "2"),
            ("COMMISSION_SETTLEMENT__WORKER_COUNT", "8"),
            ("COMMISSION_SETTLEMENT__RETRY_DELAYS_MS", "10,20,30"),
            ("COMMISSION_SETTLEMENT__PROCESSING_LEASE_SECS", "120"),
            ("COMMISSION_LOG_JSON", "true"),
        ]);

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.url, "postgres://db/commission");
        assert_eq!(config.database.lock_timeout, Duration::from_secs(2));
        assert_eq!(config.settlement.worker_count, 8);
        assert_eq!(config.settlement.retry_delays_ms, vec![10, 20, 30]);
        assert_eq!(config.settlement.processing_lease(), Duration::from_secs(120));
        assert!(config.log_json);
    }

    #[test]
    fn test_upline_depth_beyond_tiers_fails_to_load() {
        let err = try_load_from(&[("COMMISSION_SETTLEMENT__MAX_UPLINE_DEPTH", "255")]).unwrap_err();
        assert!(err.to_string().contains("max_upline_depth"));

        let config = load_from(&[("COMMISSION_SETTLEMENT__MAX_UPLINE_DEPTH", "3")]);
        assert_eq!(config.settlement.max_upline_depth, 3);
    }
}

//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

use slotswap_engine::SwapPolicy;

use crate::error::{DaemonError, DaemonResult};

/// Default HTTP port when neither `SLOTSWAP_API_PORT` nor `PORT` is set.
pub const DEFAULT_PORT: u16 = 4000;

/// Default notification buffer per subscriber.
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 1000;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Which slots a swap request requires to be SWAPPABLE
    pub swap_policy: SwapPolicy,

    /// Notifications buffered before a slow SSE client lags
    pub event_bus_capacity: usize,

    /// PostgreSQL connection string; the in-memory store is used without it
    pub database_url: Option<String>,

    /// Log output format
    pub log_format: LogFormat,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

impl ApiConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> DaemonResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let environment = Self::load_environment(get("SLOTSWAP_ENV"))?;
        let api = Self::load_api_config(
            get("SLOTSWAP_API_HOST"),
            get("SLOTSWAP_API_PORT").or_else(|| get("PORT")),
        )?;

        let swap_policy = match get("SLOTSWAP_SWAP_POLICY") {
            Some(value) => value
                .parse::<SwapPolicy>()
                .map_err(|e| DaemonError::Config(format!("SLOTSWAP_SWAP_POLICY: {}", e)))?,
            None => SwapPolicy::default(),
        };

        let event_bus_capacity = match get("SLOTSWAP_EVENT_BUS_CAPACITY") {
            Some(value) => match value.parse::<usize>() {
                Ok(capacity) if capacity > 0 => capacity,
                _ => {
                    return Err(DaemonError::Config(format!(
                        "Invalid SLOTSWAP_EVENT_BUS_CAPACITY: {}",
                        value
                    )))
                },
            },
            None => DEFAULT_EVENT_BUS_CAPACITY,
        };

        let log_format = match get("SLOTSWAP_LOG_FORMAT") {
            Some(value) => Self::parse_log_format(&value)?,
            None => LogFormat::default(),
        };

        Ok(Self {
            api,
            swap_policy,
            event_bus_capacity,
            database_url: get("DATABASE_URL"),
            log_format,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            swap_policy: SwapPolicy::BothSwappable,
            event_bus_capacity: 100,
            database_url: None,
            log_format: LogFormat::Pretty,
            environment: Environment::Test,
        }
    }

    fn load_environment(value: Option<String>) -> DaemonResult<Environment> {
        let env_str = value.unwrap_or_else(|| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid SLOTSWAP_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config(host: Option<String>, port: Option<String>) -> DaemonResult<ApiConfig> {
        let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match port {
            Some(port_str) => port_str
                .parse::<u16>()
                .map_err(|_| DaemonError::Config(format!("Invalid API port: {}", port_str)))?,
            None => DEFAULT_PORT,
        };

        Ok(ApiConfig { host, port })
    }

    fn parse_log_format(value: &str) -> DaemonResult<LogFormat> {
        match value.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" | "plain" => Ok(LogFormat::Pretty),
            other => Err(DaemonError::Config(format!(
                "Invalid SLOTSWAP_LOG_FORMAT: {}. Expected: pretty, json",
                other
            ))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig { host: "0.0.0.0".to_string(), port: DEFAULT_PORT },
            swap_policy: SwapPolicy::default(),
            event_bus_capacity: DEFAULT_EVENT_BUS_CAPACITY,
            database_url: None,
            log_format: LogFormat::default(),
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> DaemonResult<Config> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.api.port, 4000);
        assert_eq!(config.swap_policy, SwapPolicy::BothSwappable);
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_test_config() {
        let config = Config::test();

        assert_eq!(config.api.port, 0);
        assert_eq!(config.api.bind_addr(), "127.0.0.1:0");
        assert_eq!(config.environment, Environment::Test);
    }

    #[test]
    fn test_empty_lookup_uses_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.api.port, DEFAULT_PORT);
        assert_eq!(config.event_bus_capacity, DEFAULT_EVENT_BUS_CAPACITY);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_port_falls_back_to_port_var() {
        let config = load(&[("PORT", "5000")]).unwrap();
        assert_eq!(config.api.port, 5000);

        let config = load(&[("PORT", "5000"), ("SLOTSWAP_API_PORT", "6000")]).unwrap();
        assert_eq!(config.api.port, 6000);
    }

    #[test]
    fn test_full_lookup() {
        let config = load(&[
            ("SLOTSWAP_ENV", "prod"),
            ("SLOTSWAP_SWAP_POLICY", "requester-only"),
            ("SLOTSWAP_EVENT_BUS_CAPACITY", "16"),
            ("SLOTSWAP_LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/slotswap"),
        ])
        .unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.swap_policy, SwapPolicy::RequesterOnly);
        assert_eq!(config.event_bus_capacity, 16);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/slotswap"));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for pairs in [
            [("SLOTSWAP_ENV", "staging")],
            [("SLOTSWAP_API_PORT", "not-a-port")],
            [("SLOTSWAP_SWAP_POLICY", "anyone")],
            [("SLOTSWAP_EVENT_BUS_CAPACITY", "0")],
            [("SLOTSWAP_LOG_FORMAT", "xml")],
        ] {
            let err = load(&pairs).unwrap_err();
            assert!(matches!(err, DaemonError::Config(_)), "unexpected error: {err}");
        }
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}

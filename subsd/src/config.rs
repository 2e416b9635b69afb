//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use std::env;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Store configuration
    pub store: StoreConfig,

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
    /// Page size used by `/list` when `limit` is absent
    pub default_page_limit: i64,
    /// Upper bound applied to `limit`
    pub max_page_limit: i64,
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL DSN; `None` selects the in-memory store
    pub database_url: Option<String>,
    /// Connection pool size
    pub max_connections: u32,
    /// Deadline applied to every store operation
    pub op_timeout: Duration,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment
    Test,
    /// Development environment
    Development,
    /// Production environment (JSON logs)
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let store = Self::load_store_config()?;

        Ok(Self {
            api,
            store,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                default_page_limit: 10,
                max_page_limit: 100,
            },
            store: StoreConfig {
                database_url: None,
                max_connections: 2,
                op_timeout: Duration::from_secs(5),
            },
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("SUBS_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid SUBS_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("SUBS_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = Self::load_parsed_env("SUBS_API_PORT", 8080u16)?;
        let default_page_limit = Self::load_parsed_env("SUBS_DEFAULT_PAGE_LIMIT", 10i64)?;
        let max_page_limit = Self::load_parsed_env("SUBS_MAX_PAGE_LIMIT", 100i64)?;

        if default_page_limit < 1 || max_page_limit < 1 {
            return Err(DaemonError::Config(format!(
                "Page limits must be positive: default {}, max {}",
                default_page_limit, max_page_limit
            )));
        }

        Ok(ApiConfig {
            host,
            port,
            default_page_limit: default_page_limit.min(max_page_limit),
            max_page_limit,
        })
    }

    fn load_store_config() -> DaemonResult<StoreConfig> {
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());
        let max_connections = Self::load_parsed_env("SUBS_DB_MAX_CONNECTIONS", 10u32)?;
        let timeout_secs = Self::load_parsed_env("SUBS_STORE_TIMEOUT_SECS", 5u64)?;

        if timeout_secs == 0 {
            return Err(DaemonError::Config("SUBS_STORE_TIMEOUT_SECS must be positive".to_string()));
        }

        Ok(StoreConfig {
            database_url,
            max_connections,
            op_timeout: Duration::from_secs(timeout_secs),
        })
    }

    fn load_parsed_env<T: FromStr>(key: &str, default: T) -> DaemonResult<T> {
        match env::var(key) {
            Ok(val) => val
                .trim()
                .parse::<T>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                default_page_limit: 10,
                max_page_limit: 100,
            },
            store: StoreConfig {
                database_url: None,
                max_connections: 10,
                op_timeout: Duration::from_secs(5),
            },
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

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.api.port, 8080);
        assert_eq!(config.environment, Environment::Development);
        assert!(config.store.database_url.is_none());
    }

    #[test]
    fn test_test_config() {
        let config = Config::test();

        assert_eq!(config.api.port, 0);
        assert_eq!(config.environment, Environment::Test);
    }

    #[test]
    fn test_store_config_defaults() {
        let config = Config::default();

        assert_eq!(config.store.max_connections, 10);
        assert_eq!(config.store.op_timeout, Duration::from_secs(5));
        assert_eq!(config.api.default_page_limit, 10);
        assert_eq!(config.api.max_page_limit, 100);
    }

    #[test]
    fn test_load_parsed_env_falls_back_to_default() {
        let value = Config::load_parsed_env("SUBS_TEST_UNSET_VARIABLE", 42u32).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}

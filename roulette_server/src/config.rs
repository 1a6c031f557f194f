//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use roulette::{
    db::{DEFAULT_TRANSACTION_TIMEOUT, DatabaseConfig},
    dispatch::DispatcherConfig,
    hub::HubConfig,
    round::RoundConfig,
    wheel::{WheelConfig, WheelTable},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default bind address for the HTTP/WebSocket listener
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Dispatcher queue and worker pool sizing
    pub dispatcher: DispatcherConfig,
    /// Hub inbox sizing
    pub hub: HubConfig,
    /// Settle delay and bet limit
    pub round: RoundConfig,
    /// Per-request deadline
    pub request_timeout: Duration,
    /// Outbound buffer per WebSocket subscriber
    pub ws_buffer: usize,
    /// Prometheus scrape listener, disabled when unset
    pub metrics_bind: Option<SocketAddr>,
    /// JSON wheel table, built-in table when unset
    pub wheel_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but cannot be parsed
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(addr) => addr,
            None => parse_env_strict("SERVER_BIND")?.unwrap_or_else(default_bind),
        };

        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        let defaults = DispatcherConfig::default();
        let dispatcher = DispatcherConfig {
            queue_size: parse_env_or("DISPATCHER_QUEUE_SIZE", defaults.queue_size),
            workers: parse_env_or("DISPATCHER_WORKERS", defaults.workers),
        };

        let hub = HubConfig {
            inbox_size: parse_env_or("HUB_INBOX_SIZE", HubConfig::default().inbox_size),
        };

        let defaults = RoundConfig::default();
        let round = RoundConfig {
            settle_delay: Duration::from_secs(parse_env_or(
                "SETTLE_DELAY_SECS",
                defaults.settle_delay.as_secs(),
            )),
            max_bets_per_round: parse_env_or("MAX_BETS_PER_ROUND", defaults.max_bets_per_round),
        };

        Ok(ServerConfig {
            bind,
            database,
            dispatcher,
            hub,
            round,
            request_timeout: Duration::from_secs(parse_env_or(
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_TRANSACTION_TIMEOUT.as_secs(),
            )),
            ws_buffer: parse_env_or("WS_BUFFER_SIZE", 64),
            metrics_bind: parse_env_strict("METRICS_BIND")?,
            wheel_path: std::env::var("WHEEL_CONFIG_PATH").ok().map(PathBuf::from),
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dispatcher
            .validate()
            .map_err(|e| ConfigError::Invalid {
                var: "DISPATCHER_QUEUE_SIZE/DISPATCHER_WORKERS".to_string(),
                reason: e.to_string(),
            })?;

        if self.hub.inbox_size == 0 {
            return Err(ConfigError::Invalid {
                var: "HUB_INBOX_SIZE".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.ws_buffer == 0 {
            return Err(ConfigError::Invalid {
                var: "WS_BUFFER_SIZE".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.round.max_bets_per_round == 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_BETS_PER_ROUND".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "REQUEST_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.max_connections == 0
            || self.database.min_connections > self.database.max_connections
        {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason: format!(
                    "Must be positive and at least DB_MIN_CONNECTIONS ({})",
                    self.database.min_connections
                ),
            });
        }

        Ok(())
    }

    /// Build the wheel table from `wheel_path`, or the built-in table
    pub fn wheel_table(&self) -> Result<WheelTable, ConfigError> {
        let Some(path) = &self.wheel_path else {
            return Ok(WheelTable::default());
        };

        let invalid = |reason: String| ConfigError::Invalid {
            var: "WHEEL_CONFIG_PATH".to_string(),
            reason,
        };
        let config = WheelConfig::from_json_file(path).map_err(|e| invalid(e.to_string()))?;
        WheelTable::new(&config).map_err(|e| invalid(e.to_string()))
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse an optional variable, rejecting values that are set but malformed
fn parse_env_strict<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            var: key.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

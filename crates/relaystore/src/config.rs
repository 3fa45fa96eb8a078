use std::{env, str::FromStr, time::Duration};

use relaystore_core::store::BackoffPolicy;

/// Store configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Redis host (default: "127.0.0.1")
    pub host: String,
    /// Redis port (default: 6379)
    pub port: u16,
    /// Lifetime of an event log after its last append, in seconds (default: 86,400)
    pub log_max_lifetime_secs: u64,
    /// Interval between health checks in milliseconds (default: 5,000)
    pub health_check_interval_ms: u64,
    /// Upper bound for the reconnect backoff in milliseconds (default: 30,000)
    pub reconnect_max_backoff_ms: u64,
    /// Time allowed for a single connection attempt in milliseconds (default: 2,000)
    pub connection_timeout_ms: u64,
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `REDIS_HOST` - Redis host (default: "127.0.0.1")
    /// - `REDIS_PORT` - Redis port (default: 6379)
    /// - `LOG_MAX_LIFETIME` - Event log TTL in seconds (default: 86,400)
    /// - `HEALTH_CHECK_INTERVAL_MS` - Health check interval (default: 5,000)
    /// - `RECONNECT_MAX_BACKOFF_MS` - Reconnect backoff cap (default: 30,000)
    /// - `REDIS_CONNECTION_TIMEOUT_MS` - Per-attempt connect timeout (default: 2,000)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unset or unparsable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: lookup("REDIS_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_var(&lookup, "REDIS_PORT").unwrap_or(6379),
            log_max_lifetime_secs: parse_var(&lookup, "LOG_MAX_LIFETIME").unwrap_or(86_400),
            health_check_interval_ms: parse_var(&lookup, "HEALTH_CHECK_INTERVAL_MS")
                .unwrap_or(5_000),
            reconnect_max_backoff_ms: parse_var(&lookup, "RECONNECT_MAX_BACKOFF_MS")
                .unwrap_or(30_000),
            connection_timeout_ms: parse_var(&lookup, "REDIS_CONNECTION_TIMEOUT_MS")
                .unwrap_or(2_000),
        }
    }

    /// Redis connection URL built from host and port.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }

    /// Get the event log TTL as a Duration.
    pub fn log_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.log_max_lifetime_secs)
    }

    /// Get the health check interval as a Duration.
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Get the per-attempt connection timeout as a Duration.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Backoff applied between failed health checks.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        let max = Duration::from_millis(self.reconnect_max_backoff_ms);
        BackoffPolicy::new(BackoffPolicy::default().initial.min(max), max)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|v| v.parse().ok())
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

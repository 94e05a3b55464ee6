//! Server configuration loaded from environment variables.

use std::time::Duration;

/// Process configuration.
///
/// Every field has a default, so an empty environment runs the whole system
/// in memory on port 3000.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Log level filter string.
    pub log_level: String,
    /// PostgreSQL connection string. In-memory stores are used when unset.
    pub database_url: Option<String>,
    /// Node id mixed into generated order ids.
    pub node_id: i64,
    /// Lease of the per-goods stock lock.
    pub lock_lease: Duration,
    /// How long a reservation waits for a busy stock lock.
    pub lock_wait: Duration,
    /// Budget of the order-creation local transaction.
    pub local_tx_timeout: Duration,
    /// Interval between status checks of unresolved half messages.
    pub tx_check_interval: Duration,
    /// Delay tier of the payment-timeout message.
    pub payment_timeout_delay_level: u8,
    /// Consumer poll interval.
    pub consumer_poll: Duration,
}

impl Config {
    /// Loads configuration from environment variables with sensible defaults.
    ///
    /// Unparseable values fall back to the default for that field.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.parse::<u64>().ok());
        let millis =
            |key: &str, default: Duration| parsed(key).map(Duration::from_millis).unwrap_or(default);

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            node_id: lookup("NODE_ID")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.node_id),
            lock_lease: millis("LOCK_LEASE_MS", defaults.lock_lease),
            lock_wait: millis("LOCK_WAIT_MS", defaults.lock_wait),
            local_tx_timeout: millis("LOCAL_TX_TIMEOUT_MS", defaults.local_tx_timeout),
            tx_check_interval: millis("TX_CHECK_INTERVAL_MS", defaults.tx_check_interval),
            payment_timeout_delay_level: lookup("PAYMENT_TIMEOUT_DELAY_LEVEL")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.payment_timeout_delay_level),
            consumer_poll: millis("CONSUMER_POLL_MS", defaults.consumer_poll),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            node_id: 1,
            lock_lease: Duration::from_secs(8),
            lock_wait: Duration::from_secs(3),
            local_tx_timeout: Duration::from_secs(3),
            tx_check_interval: Duration::from_secs(6),
            payment_timeout_delay_level: 3,
            consumer_poll: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.database_url, None);
        assert_eq!(config.payment_timeout_delay_level, 3);
        assert_eq!(config.tx_check_interval, Duration::from_secs(6));
    }

    #[test]
    fn test_empty_environment_is_default() {
        assert_eq!(from_pairs(&[]), Config::default());
    }

    #[test]
    fn test_reads_every_variable() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("RUST_LOG", "debug"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("NODE_ID", "7"),
            ("LOCK_LEASE_MS", "500"),
            ("LOCK_WAIT_MS", "250"),
            ("LOCAL_TX_TIMEOUT_MS", "1000"),
            ("TX_CHECK_INTERVAL_MS", "2000"),
            ("PAYMENT_TIMEOUT_DELAY_LEVEL", "16"),
            ("CONSUMER_POLL_MS", "10"),
        ]);

        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/shop")
        );
        assert_eq!(config.node_id, 7);
        assert_eq!(config.lock_lease, Duration::from_millis(500));
        assert_eq!(config.lock_wait, Duration::from_millis(250));
        assert_eq!(config.local_tx_timeout, Duration::from_secs(1));
        assert_eq!(config.tx_check_interval, Duration::from_secs(2));
        assert_eq!(config.payment_timeout_delay_level, 16);
        assert_eq!(config.consumer_poll, Duration::from_millis(10));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = from_pairs(&[("PORT", "http"), ("LOCK_WAIT_MS", "-1"), ("DATABASE_URL", "")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.lock_wait, Duration::from_secs(3));
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn test_addr_default() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }
}

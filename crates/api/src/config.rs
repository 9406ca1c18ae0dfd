//! Application configuration loaded from environment variables.

use std::time::Duration;

use domain::CartConfig;
use pipeline::{OutboxConfig, PipelineConfig};

/// Process configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL url; the in-memory store is used when unset
/// - `DATABASE_MAX_CONNECTIONS`: PostgreSQL pool size (default: `10`)
/// - `REDIS_URL`: Redis url; the in-memory cache and broker are used when unset
/// - `CONSUMER_LOOPS`: consumer loops per topic (default: `6`)
/// - `DISPATCHER_CAPACITY`: in-flight messages per loop (default: `50`)
/// - `CART_READ_TTL_SECS`: cart TTL set on cache fill (default: 24 hours)
/// - `CART_WRITE_TTL_SECS`: cart TTL set on cart writes (default: 7 days)
/// - `OUTBOX_POLL_INTERVAL_SECS`: outbox relay scan interval (default: `5`)
/// - `PAYMENT_DELAY_MS`: simulated payment gateway latency (default: `2000`)
/// - `NOTICE_DELAY_MS`: simulated notifier latency (default: `1000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub consumer_loops: usize,
    pub dispatcher_capacity: usize,
    pub cart_read_ttl: Duration,
    pub cart_write_ttl: Duration,
    pub outbox_poll_interval: Duration,
    pub payment_delay: Duration,
    pub notice_delay: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup. Unparsable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let secs = |key: &str, default: Duration| parsed(key).map_or(default, Duration::from_secs);
        let millis =
            |key: &str, default: Duration| parsed(key).map_or(default, Duration::from_millis);

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.database_max_connections),
            redis_url: lookup("REDIS_URL").filter(|url| !url.is_empty()),
            consumer_loops: parsed("CONSUMER_LOOPS")
                .filter(|n| *n > 0)
                .map_or(defaults.consumer_loops, |n| n as usize),
            dispatcher_capacity: parsed("DISPATCHER_CAPACITY")
                .filter(|n| *n > 0)
                .map_or(defaults.dispatcher_capacity, |n| n as usize),
            cart_read_ttl: secs("CART_READ_TTL_SECS", defaults.cart_read_ttl),
            cart_write_ttl: secs("CART_WRITE_TTL_SECS", defaults.cart_write_ttl),
            outbox_poll_interval: secs("OUTBOX_POLL_INTERVAL_SECS", defaults.outbox_poll_interval),
            payment_delay: millis("PAYMENT_DELAY_MS", defaults.payment_delay),
            notice_delay: millis("NOTICE_DELAY_MS", defaults.notice_delay),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            loops_per_topic: self.consumer_loops,
            dispatcher_capacity: self.dispatcher_capacity,
            ..PipelineConfig::default()
        }
    }

    pub fn cart(&self) -> CartConfig {
        CartConfig {
            read_ttl: self.cart_read_ttl,
            write_ttl: self.cart_write_ttl,
        }
    }

    pub fn outbox(&self) -> OutboxConfig {
        OutboxConfig {
            poll_interval: self.outbox_poll_interval,
            ..OutboxConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        let cart = CartConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 10,
            redis_url: None,
            consumer_loops: pipeline.loops_per_topic,
            dispatcher_capacity: pipeline.dispatcher_capacity,
            cart_read_ttl: cart.read_ttl,
            cart_write_ttl: cart.write_ttl,
            outbox_poll_interval: OutboxConfig::default().poll_interval,
            payment_delay: Duration::from_millis(2000),
            notice_delay: Duration::from_millis(1000),
        }
    }
}

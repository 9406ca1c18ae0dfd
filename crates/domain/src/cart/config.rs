use std::time::Duration;

/// Cache lifetimes for cart entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartConfig {
    /// TTL set when a read repopulates the cache.
    pub read_ttl: Duration,
    /// TTL set on every cart write.
    pub write_ttl: Duration,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            read_ttl: Duration::from_secs(24 * 60 * 60),
            write_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

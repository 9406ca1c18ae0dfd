use thiserror::Error;

/// Errors that can occur when talking to the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The Redis client reported an error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The cache could not be reached.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

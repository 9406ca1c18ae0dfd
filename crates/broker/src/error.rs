use common::Topic;
use thiserror::Error;

/// Errors that can occur when publishing or consuming.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The Redis client reported an error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A delivered message was missing its payload field.
    #[error("Malformed message {id} on {topic}")]
    MalformedMessage { topic: Topic, id: String },

    /// The broker could not be reached.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

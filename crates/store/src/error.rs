use thiserror::Error;

/// Errors that can occur when interacting with the primary store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A column value, read or about to be written, is outside its domain.
    #[error("Invalid value {value:?} in column {column}")]
    InvalidColumn { column: &'static str, value: String },

    /// The caller failed to build the outbox messages of an order.
    #[error("Failed to build outbox messages: {0}")]
    Outbox(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

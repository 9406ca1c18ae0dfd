//! Pipeline error types.

use broker::BrokerError;
use common::{OrderId, ProductId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while consuming and handling messages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An error occurred in the primary store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An error occurred talking to the broker.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// A message payload could not be decoded.
    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Product not found.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Payment gateway error.
    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    /// Notification service error.
    #[error("Notifier error: {0}")]
    Notifier(String),

    /// The dispatcher stopped admitting work.
    #[error("Dispatcher closed")]
    DispatcherClosed,
}

/// Convenience type alias for pipeline results.
pub type Result<T> = std::result::Result<T, PipelineError>;

//! Domain error types.

use broker::BrokerError;
use common::{OrderId, ProductId, UserId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the primary store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The broker rejected a publish made on the caller's path.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller supplied an invalid argument.
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// No `in_cart` row matched the user and product.
    #[error("Cart item not found: user {user_id}, product {product_id}")]
    CartItemNotFound {
        user_id: UserId,
        product_id: ProductId,
    },
}

impl DomainError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Returns true if the error was caused by the caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(self, DomainError::Validation { .. })
    }

    /// Returns true if the error reports a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DomainError::OrderNotFound(_)
                | DomainError::ProductNotFound(_)
                | DomainError::CartItemNotFound { .. }
        )
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

//! Rows the fulfillment core reads and writes.

use chrono::{DateTime, Utc};
use common::{AddressId, Money, OrderId, ProductId, Topic, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Shipping lifecycle of an order.
///
/// ```text
/// AwaitingPayment ──► AwaitingShipment ──► Shipped ──► Received
///        │
///        └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    AwaitingPayment,
    AwaitingShipment,
    Shipped,
    Received,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::AwaitingShipment => "awaiting_shipment",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Received => "received",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "awaiting_payment" => Ok(OrderStatus::AwaitingPayment),
            "awaiting_shipment" => Ok(OrderStatus::AwaitingShipment),
            "shipped" => Ok(OrderStatus::Shipped),
            "received" => Ok(OrderStatus::Received),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(StoreError::InvalidColumn {
                column: "orders.status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment lifecycle of an order. Only ever moves away from `Unpaid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(StoreError::InvalidColumn {
                column: "orders.payment_status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a cart row. Only `InCart` rows belong to the live cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    #[default]
    InCart,
    Purchased,
    Removed,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::InCart => "in_cart",
            CartStatus::Purchased => "purchased",
            CartStatus::Removed => "removed",
        }
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total_price: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub address_id: AddressId,
    pub created_at: DateTime<Utc>,
}

/// One product line of an order. Immutable once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A line item that has not been assigned to an order yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Input for inserting an order together with its line items.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub total_price: Money,
    pub address_id: AddressId,
    pub items: Vec<NewLineItem>,
}

/// Catalogue metadata plus the cumulative sales counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub image_url: String,
    pub sales: u64,
}

impl Product {
    /// Creates a product with an empty description and image.
    pub fn new(product_id: ProductId, name: impl Into<String>, price: Money) -> Self {
        Self {
            product_id,
            name: name.into(),
            description: String::new(),
            price,
            image_url: String::new(),
            sales: 0,
        }
    }
}

/// A cart row joined with its product metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Row id. Absent when the line was rebuilt from the cache.
    pub cart_id: Option<u64>,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_description: String,
    pub price: Money,
    pub image_url: String,
    pub quantity: i64,
}

impl CartLine {
    /// Builds a line from product metadata and a quantity.
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        Self {
            cart_id: None,
            product_id: product.product_id,
            product_name: product.name.clone(),
            product_description: product.description.clone(),
            price: product.price,
            image_url: product.image_url.clone(),
            quantity,
        }
    }
}

/// An event written in the same transaction as the order that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub topic: Topic,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    pub fn new(topic: Topic, payload: Vec<u8>) -> Self {
        Self::with_id(Uuid::new_v4(), topic, payload)
    }

    /// Creates a message whose id is chosen by the caller, e.g. so that the id
    /// can also travel inside the payload as an idempotency key.
    pub fn with_id(id: Uuid, topic: Topic, payload: Vec<u8>) -> Self {
        Self {
            id,
            topic,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Result of applying a sales increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalesOutcome {
    /// The counter was incremented.
    Applied,
    /// The idempotency key was already recorded; nothing changed.
    Duplicate,
    /// No product row matched; nothing changed.
    UnknownProduct,
}

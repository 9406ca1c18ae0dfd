//! Domain layer for the marketplace fulfillment pipeline.
//!
//! This crate provides the operations callers invoke synchronously:
//! - Order placement, which commits an order with its outbox messages
//! - Payment requests and order lookups
//! - The event producer that publishes those messages to the broker
//! - Cache-aside cart reads and writes

pub mod cart;
pub mod error;
pub mod events;
pub mod order;
pub mod producer;

pub use cart::{CartConfig, CartService};
pub use error::{DomainError, Result};
pub use events::{FulfillmentEvent, NoticeEvent, PaymentEvent, SalesEvent};
pub use order::{
    CreateOrderInput, OrderDetails, OrderItemInput, OrderReceipt, OrderService, PaymentRequest,
};
pub use producer::{EventProducer, PublishReport, outbox_messages};

//! Primary store for the marketplace.
//!
//! The store is authoritative for orders, line items, products and cart rows.
//! Every mutation the fulfillment pipeline needs is a single atomic operation
//! (conditional update, atomic increment, upsert) so that concurrent workers
//! coordinate through the store instead of through in-process locks.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    CartLine, CartStatus, NewLineItem, NewOrder, Order, OrderLineItem, OrderStatus,
    OutboxMessage, PaymentStatus, Product, SalesOutcome,
};
pub use postgres::PostgresStore;
pub use store::Store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AddressId, OrderId, ProductId, UserId};
use uuid::Uuid;

use crate::{
    CartLine, NewOrder, Order, OrderLineItem, OutboxMessage, Product, Result, SalesOutcome,
};

/// Core trait for primary store implementations.
///
/// All implementations must be thread-safe (Send + Sync). Each method is a
/// single atomic operation against the store; callers never hold a lock or a
/// transaction across calls.
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts an order, its line items and its outbox messages atomically.
    ///
    /// The new order starts as `awaiting_payment` / `unpaid`. `outbox` is
    /// called once the order id is known and its messages are written in the
    /// same transaction, so an order is never committed without its events.
    /// An error from `outbox` aborts the whole insert.
    async fn create_order<F>(
        &self,
        order: NewOrder,
        outbox: F,
    ) -> Result<(Order, Vec<OrderLineItem>, Vec<OutboxMessage>)>
    where
        F: FnOnce(&Order, &[OrderLineItem]) -> Result<Vec<OutboxMessage>> + Send;

    /// Loads an order by id.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads a user's orders, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Loads the line items of an order.
    async fn order_line_items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>>;

    /// Moves an unpaid order to `paid` / `awaiting_shipment`.
    ///
    /// This is a conditional update: it only matches rows whose payment status
    /// is still `unpaid`. Returns true if this call performed the transition.
    async fn mark_order_paid(&self, order_id: OrderId) -> Result<bool>;

    /// Cancels an order; an unpaid order also gets its payment cancelled.
    ///
    /// Returns the updated order, or None if it doesn't exist.
    async fn cancel_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Returns the user's default shipping address, if one is set.
    async fn default_address(&self, user_id: UserId) -> Result<Option<AddressId>>;

    /// Loads a product by id.
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Loads every product among `product_ids` that exists.
    async fn products_by_ids(&self, product_ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Atomically adds `quantity` to a product's sales counter.
    ///
    /// With a `dedup_key`, the key is recorded in the sales ledger in the same
    /// transaction and a key seen before makes the call a no-op.
    async fn add_sales(
        &self,
        product_id: ProductId,
        quantity: u64,
        dedup_key: Option<Uuid>,
    ) -> Result<SalesOutcome>;

    /// Returns the user's `in_cart` rows joined with product metadata.
    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>>;

    /// Inserts an `in_cart` row or adds `quantity` to the existing one.
    async fn upsert_cart_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<()>;

    /// Deletes the user's `in_cart` row for a product. Returns rows affected.
    async fn delete_cart_item(&self, user_id: UserId, product_id: ProductId) -> Result<u64>;

    /// Sets the quantity of the user's `in_cart` row. Returns rows affected.
    async fn set_cart_item_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<u64>;

    /// Returns unpublished outbox messages created at or before `created_before`,
    /// oldest first.
    async fn pending_outbox(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>>;

    /// Marks outbox messages as published.
    async fn mark_outbox_published(&self, ids: &[Uuid]) -> Result<()>;
}

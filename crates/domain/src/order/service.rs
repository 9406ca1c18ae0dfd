//! Order service providing the order operations exposed to callers.

use broker::Broker;
use common::{OrderId, UserId};
use store::{Order, PaymentStatus, Store};

use crate::error::{DomainError, Result};
use crate::events::PaymentEvent;
use crate::producer::{EventProducer, outbox_messages};

use super::{CreateOrderInput, OrderDetails, OrderReceipt, PaymentRequest};

/// Service for placing, paying and cancelling orders.
///
/// Placing an order commits the order, its line items and its outbox messages
/// in one transaction, then hands the messages to the producer without
/// waiting for the broker.
#[derive(Clone)]
pub struct OrderService<S, B> {
    store: S,
    producer: EventProducer<S, B>,
}

impl<S, B> OrderService<S, B>
where
    S: Store + Clone + 'static,
    B: Broker + Clone + 'static,
{
    pub fn new(store: S, producer: EventProducer<S, B>) -> Self {
        Self { store, producer }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order.
    #[tracing::instrument(
        skip(self, input),
        fields(user_id = %input.user_id, items = input.items.len())
    )]
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<OrderReceipt> {
        let items = input.validate()?;

        let address_id = match input.address_id.filter(|id| !id.is_zero()) {
            Some(id) => id,
            None => self
                .store
                .default_address(input.user_id)
                .await?
                .unwrap_or_default(),
        };

        let (order, line_items, messages) = self
            .store
            .create_order(input.into_new_order(address_id, items), outbox_messages)
            .await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.order_id,
            line_items = line_items.len(),
            "Order created"
        );

        // Detached: the caller never waits on the broker.
        drop(self.producer.spawn_publish(messages));

        Ok(OrderReceipt {
            order_id: order.order_id,
            total_price: order.total_price,
            address_id: order.address_id,
        })
    }

    /// Cancels an order. An unpaid order can no longer be paid afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<OrderDetails> {
        let order = self
            .store
            .cancel_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;
        let items = self.store.order_line_items(order_id).await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, payment_status = %order.payment_status, "Order cancelled");

        Ok(OrderDetails { order, items })
    }

    /// Asks for an unpaid order to be paid by publishing a fresh payment
    /// event. This is how a caller recovers an order whose first payment
    /// message was lost.
    ///
    /// Orders that are already paid or cancelled are left alone. Payment
    /// itself still happens asynchronously in the payment consumer.
    #[tracing::instrument(skip(self))]
    pub async fn pay_order(&self, order_id: OrderId) -> Result<PaymentRequest> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;

        if order.payment_status != PaymentStatus::Unpaid {
            tracing::debug!(
                %order_id,
                payment_status = %order.payment_status,
                "Order already settled"
            );
            return Ok(PaymentRequest::AlreadySettled {
                payment_status: order.payment_status,
            });
        }

        let message_id = self.producer.publish_event(&PaymentEvent { order_id }).await?;

        metrics::counter!("payment_requests_total").increment(1);
        tracing::info!(%order_id, %message_id, "Payment requested");
        Ok(PaymentRequest::Submitted)
    }

    /// Lists a user's orders with their line items, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, user_id: UserId) -> Result<Vec<OrderDetails>> {
        if user_id.is_zero() {
            return Err(DomainError::validation("user_id", "must be non-zero"));
        }

        let orders: Vec<Order> = self.store.orders_for_user(user_id).await?;
        let mut details = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.store.order_line_items(order.order_id).await?;
            details.push(OrderDetails { order, items });
        }
        Ok(details)
    }

    /// Loads an order with its line items.
    ///
    /// Returns None if the order doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderDetails>> {
        let Some(order) = self.store.get_order(order_id).await? else {
            return Ok(None);
        };
        let items = self.store.order_line_items(order_id).await?;
        Ok(Some(OrderDetails { order, items }))
    }
}

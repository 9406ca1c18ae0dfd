use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::{OrderId, Topic};
use domain::{FulfillmentEvent, PaymentEvent};
use store::{PaymentStatus, Store};

use crate::error::{PipelineError, Result};
use crate::handler::{HandleOutcome, MessageHandler};
use crate::services::PaymentGateway;

/// Settles unpaid orders.
///
/// Safe under redelivery and concurrent delivery: only orders still unpaid
/// are confirmed, and the final update is conditional on the order still
/// being unpaid, so at most one handler moves it to paid.
///
/// Within one process an order is also claimed before the gateway is called,
/// so concurrent deliveries charge it once. Handlers in separate processes
/// share no claims; there the conditional update is the only guard and a
/// duplicate gateway call remains possible.
pub struct PaymentHandler<S, G> {
    store: S,
    gateway: G,
    claims: Mutex<HashSet<OrderId>>,
}

impl<S, G> PaymentHandler<S, G>
where
    S: Store,
    G: PaymentGateway,
{
    pub fn new(store: S, gateway: G) -> Self {
        Self {
            store,
            gateway,
            claims: Mutex::new(HashSet::new()),
        }
    }

    /// Claims an order for confirmation. None if another delivery holds it.
    fn claim(&self, order_id: OrderId) -> Option<Claim<'_>> {
        let claimed = lock(&self.claims).insert(order_id);
        claimed.then(|| Claim {
            claims: &self.claims,
            order_id,
        })
    }
}

/// Releases an order claim when dropped.
struct Claim<'a> {
    claims: &'a Mutex<HashSet<OrderId>>,
    order_id: OrderId,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        lock(self.claims).remove(&self.order_id);
    }
}

fn lock(claims: &Mutex<HashSet<OrderId>>) -> MutexGuard<'_, HashSet<OrderId>> {
    // The set stays consistent even if a holder panicked.
    claims.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl<S, G> MessageHandler for PaymentHandler<S, G>
where
    S: Store,
    G: PaymentGateway,
{
    fn topic(&self) -> Topic {
        PaymentEvent::TOPIC
    }

    #[tracing::instrument(skip_all)]
    async fn handle(&self, payload: &[u8]) -> Result<HandleOutcome> {
        let event = PaymentEvent::from_payload(payload)?;
        let order_id = event.order_id;

        // Claimed before the read: a later delivery sees whatever the
        // claim holder wrote.
        let Some(_claim) = self.claim(order_id) else {
            tracing::debug!(%order_id, "Payment already in progress");
            return Ok(HandleOutcome::Skipped("payment in progress"));
        };

        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(PipelineError::OrderNotFound(order_id))?;

        if order.payment_status != PaymentStatus::Unpaid {
            tracing::debug!(
                %order_id,
                payment_status = %order.payment_status,
                "Order already settled"
            );
            return Ok(HandleOutcome::Skipped("already settled"));
        }

        let confirmation = self.gateway.confirm(&order).await?;

        if self.store.mark_order_paid(order_id).await? {
            tracing::info!(%order_id, payment_id = %confirmation.payment_id, "Order paid");
            Ok(HandleOutcome::Processed)
        } else {
            tracing::debug!(%order_id, "Order settled concurrently");
            Ok(HandleOutcome::Skipped("settled concurrently"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use common::{AddressId, Money, OrderId, ProductId, UserId};
    use store::{InMemoryStore, NewLineItem, NewOrder, OrderStatus};

    use crate::services::SimulatedPaymentGateway;

    async fn setup() -> (
        PaymentHandler<InMemoryStore, SimulatedPaymentGateway>,
        InMemoryStore,
        SimulatedPaymentGateway,
        OrderId,
    ) {
        let store = InMemoryStore::new();
        let (order, _, _) = store
            .create_order(
                NewOrder {
                    user_id: UserId::new(7),
                    total_price: Money::from_cents(2998),
                    address_id: AddressId::new(1),
                    items: vec![NewLineItem {
                        product_id: ProductId::new(101),
                        quantity: 2,
                    }],
                },
                |_, _| Ok(vec![]),
            )
            .await
            .unwrap();
        let gateway = SimulatedPaymentGateway::new(Duration::from_millis(10));
        let handler = PaymentHandler::new(store.clone(), gateway.clone());
        (handler, store, gateway, order.order_id)
    }

    fn payload(order_id: OrderId) -> Vec<u8> {
        PaymentEvent { order_id }.to_payload().unwrap()
    }

    #[tokio::test]
    async fn test_pays_unpaid_order() {
        let (handler, store, _, order_id) = setup().await;

        let outcome = handler.handle(&payload(order_id)).await.unwrap();
        assert_eq!(outcome, HandleOutcome::Processed);

        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.status, OrderStatus::AwaitingShipment);
    }

    #[tokio::test]
    async fn test_redelivery_is_a_no_op() {
        let (handler, store, gateway, order_id) = setup().await;

        handler.handle(&payload(order_id)).await.unwrap();
        let outcome = handler.handle(&payload(order_id)).await.unwrap();

        assert!(matches!(outcome, HandleOutcome::Skipped(_)));
        assert_eq!(gateway.call_count(), 1);
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_pay_once() {
        let (handler, store, gateway, order_id) = setup().await;
        let handler = Arc::new(handler);

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let handler = handler.clone();
            tasks.push(tokio::spawn(
                async move { handler.handle(&payload(order_id)).await },
            ));
        }

        let mut processed = 0;
        for task in tasks {
            if task.await.unwrap().unwrap() == HandleOutcome::Processed {
                processed += 1;
            }
        }
        assert_eq!(processed, 1);
        assert_eq!(gateway.call_count(), 1);

        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.status, OrderStatus::AwaitingShipment);
    }

    #[tokio::test]
    async fn test_claim_released_after_gateway_failure() {
        let (handler, store, gateway, order_id) = setup().await;
        gateway.set_fail_on_confirm(true);
        assert!(handler.handle(&payload(order_id)).await.is_err());

        gateway.set_fail_on_confirm(false);
        let outcome = handler.handle(&payload(order_id)).await.unwrap();
        assert_eq!(outcome, HandleOutcome::Processed);
        assert_eq!(gateway.call_count(), 2);
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_cancelled_order_is_not_charged() {
        let (handler, store, gateway, order_id) = setup().await;
        store.cancel_order(order_id).await.unwrap();

        let outcome = handler.handle(&payload(order_id)).await.unwrap();
        assert!(matches!(outcome, HandleOutcome::Skipped(_)));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_order_unpaid() {
        let (handler, store, gateway, order_id) = setup().await;
        gateway.set_fail_on_confirm(true);

        assert!(handler.handle(&payload(order_id)).await.is_err());
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_missing_order_and_bad_payload() {
        let (handler, _, _, _) = setup().await;
        assert!(matches!(
            handler.handle(&payload(OrderId::new(999))).await,
            Err(PipelineError::OrderNotFound(_))
        ));
        assert!(matches!(
            handler.handle(b"{}").await,
            Err(PipelineError::Decode(_))
        ));
    }
}

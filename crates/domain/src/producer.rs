//! Event producer.
//!
//! Turns a committed order into its fulfillment messages and publishes them.
//! Messages are first written to the outbox in the order's transaction, so a
//! failed publish here is only delayed, never lost.

use broker::Broker;
use store::{Order, OrderLineItem, OutboxMessage, Store, StoreError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::events::{FulfillmentEvent, NoticeEvent, PaymentEvent, SalesEvent};

/// Outcome of a publish attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: usize,
    pub failed: usize,
}

/// Publishes outbox messages to the broker.
#[derive(Clone)]
pub struct EventProducer<S, B> {
    store: S,
    broker: B,
}

impl<S, B> EventProducer<S, B>
where
    S: Store + Clone + 'static,
    B: Broker + Clone + 'static,
{
    pub fn new(store: S, broker: B) -> Self {
        Self { store, broker }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Publishes messages and marks the delivered ones as published.
    ///
    /// Failures are logged and counted, never returned: the outbox relay picks
    /// up whatever is left unpublished.
    #[tracing::instrument(skip(self, messages), fields(messages = messages.len()))]
    pub async fn publish(&self, messages: &[OutboxMessage]) -> PublishReport {
        let mut report = PublishReport::default();
        let mut delivered = Vec::with_capacity(messages.len());

        for message in messages {
            match self.broker.publish(message.topic, &message.payload).await {
                Ok(_) => {
                    report.published += 1;
                    delivered.push(message.id);
                }
                Err(e) => {
                    report.failed += 1;
                    metrics::counter!(
                        "producer_publish_failures_total",
                        "topic" => message.topic.name()
                    )
                    .increment(1);
                    tracing::warn!(
                        topic = %message.topic,
                        message_id = %message.id,
                        error = %e,
                        "Failed to publish message"
                    );
                }
            }
        }

        if !delivered.is_empty()
            && let Err(e) = self.store.mark_outbox_published(&delivered).await
        {
            // The relay will publish these rows a second time.
            tracing::warn!(
                error = %e,
                count = delivered.len(),
                "Failed to mark outbox rows published"
            );
        }

        report
    }

    /// Publishes a single event straight to the broker, bypassing the outbox.
    ///
    /// Unlike [`publish`](Self::publish), a failure is returned to the caller.
    #[tracing::instrument(skip(self, event), fields(topic = %E::TOPIC))]
    pub async fn publish_event<E: FulfillmentEvent>(&self, event: &E) -> crate::Result<String> {
        let payload = event.to_payload()?;
        self.broker.publish(E::TOPIC, &payload).await.map_err(|e| {
            metrics::counter!("producer_publish_failures_total", "topic" => E::TOPIC.name())
                .increment(1);
            crate::DomainError::from(e)
        })
    }

    /// Publishes messages on a background task, off the caller's path.
    pub fn spawn_publish(&self, messages: Vec<OutboxMessage>) -> JoinHandle<PublishReport> {
        let producer = self.clone();
        tokio::spawn(async move { producer.publish(&messages).await })
    }
}

/// Builds the messages for a new order: one payment event, one sales
/// event per line item and one notice event.
///
/// Each sales event carries its outbox row id as idempotency key, so a
/// republished row is not counted twice.
pub fn outbox_messages(
    order: &Order,
    items: &[OrderLineItem],
) -> store::Result<Vec<OutboxMessage>> {
    let mut messages = Vec::with_capacity(items.len() + 2);

    messages.push(encode(&PaymentEvent {
        order_id: order.order_id,
    })?);

    for item in items {
        let id = Uuid::new_v4();
        let event = SalesEvent {
            product_id: item.product_id,
            quantity: u64::from(item.quantity),
            event_id: Some(id),
        };
        messages.push(OutboxMessage::with_id(
            id,
            SalesEvent::TOPIC,
            payload_of(&event)?,
        ));
    }

    messages.push(encode(&NoticeEvent {
        order_id: order.order_id,
    })?);

    Ok(messages)
}

fn payload_of<E: FulfillmentEvent>(event: &E) -> store::Result<Vec<u8>> {
    event
        .to_payload()
        .map_err(|e| StoreError::Outbox(e.to_string()))
}

fn encode<E: FulfillmentEvent>(event: &E) -> store::Result<OutboxMessage> {
    Ok(OutboxMessage::new(E::TOPIC, payload_of(event)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::InMemoryBroker;
    use common::{AddressId, Money, OrderId, ProductId, Topic, UserId};
    use store::{InMemoryStore, NewLineItem, NewOrder, OrderStatus, PaymentStatus};

    fn sample_order(id: u64) -> Order {
        Order {
            order_id: OrderId::new(id),
            user_id: UserId::new(7),
            total_price: Money::from_cents(2998),
            status: OrderStatus::AwaitingPayment,
            payment_status: PaymentStatus::Unpaid,
            address_id: AddressId::new(1),
            created_at: Default::default(),
        }
    }

    fn items(order_id: OrderId) -> Vec<OrderLineItem> {
        vec![
            OrderLineItem {
                order_id,
                product_id: ProductId::new(101),
                quantity: 2,
            },
            OrderLineItem {
                order_id,
                product_id: ProductId::new(102),
                quantity: 1,
            },
        ]
    }

    #[test]
    fn test_outbox_messages_cover_every_topic() {
        let order = sample_order(5);
        let messages = outbox_messages(&order, &items(order.order_id)).unwrap();

        let topics: Vec<Topic> = messages.iter().map(|m| m.topic).collect();
        assert_eq!(
            topics,
            vec![Topic::Payment, Topic::Sales, Topic::Sales, Topic::Notice]
        );

        let payment = PaymentEvent::from_payload(&messages[0].payload).unwrap();
        assert_eq!(payment.order_id, OrderId::new(5));

        let sales = SalesEvent::from_payload(&messages[1].payload).unwrap();
        assert_eq!(sales.product_id, ProductId::new(101));
        assert_eq!(sales.quantity, 2);
        assert_eq!(sales.event_id, Some(messages[1].id));
    }

    #[tokio::test]
    async fn test_publish_marks_outbox_rows() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        let producer = EventProducer::new(store.clone(), broker.clone());

        let (_, _, messages) = store
            .create_order(
                NewOrder {
                    user_id: UserId::new(7),
                    total_price: Money::from_cents(100),
                    address_id: AddressId::new(1),
                    items: vec![NewLineItem {
                        product_id: ProductId::new(101),
                        quantity: 1,
                    }],
                },
                outbox_messages,
            )
            .await
            .unwrap();
        assert_eq!(store.unpublished_outbox_count().await, 3);

        let report = producer.spawn_publish(messages).await.unwrap();
        assert_eq!(report.published, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(store.unpublished_outbox_count().await, 0);
        assert_eq!(broker.published(Topic::Sales).await.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_rows_pending() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        let producer = EventProducer::new(store.clone(), broker.clone());
        broker.set_fail_publish(true);

        let order = sample_order(1);
        let messages = outbox_messages(&order, &items(order.order_id)).unwrap();

        let report = producer.publish(&messages).await;
        assert_eq!(report.published, 0);
        assert_eq!(report.failed, 4);
        assert!(broker.published(Topic::Payment).await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_event_reports_broker_failure() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        let producer = EventProducer::new(store, broker.clone());
        let event = PaymentEvent {
            order_id: OrderId::new(3),
        };

        producer.publish_event(&event).await.unwrap();
        assert_eq!(broker.published(Topic::Payment).await.len(), 1);

        broker.set_fail_publish(true);
        let err = producer.publish_event(&event).await.unwrap_err();
        assert!(matches!(err, crate::DomainError::Broker(_)));
        assert_eq!(broker.published(Topic::Payment).await.len(), 1);
    }
}

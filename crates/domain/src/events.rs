//! Messages published to the fulfillment topics.

use common::{OrderId, ProductId, Topic};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// A message carried on one of the fulfillment topics as JSON.
pub trait FulfillmentEvent: Serialize + DeserializeOwned {
    /// The topic this event is published to.
    const TOPIC: Topic;

    /// Encodes the event as a broker payload.
    fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decodes an event from a broker payload.
    fn from_payload(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

/// Requests settlement of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub order_id: OrderId,
}

impl FulfillmentEvent for PaymentEvent {
    const TOPIC: Topic = Topic::Payment;
}

/// Adds sold units to a product's sales counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesEvent {
    pub product_id: ProductId,
    pub quantity: u64,
    /// Idempotency key. Events without one are applied on every delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
}

impl FulfillmentEvent for SalesEvent {
    const TOPIC: Topic = Topic::Sales;
}

/// Asks for the owner of an order to be notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeEvent {
    pub order_id: OrderId,
}

impl FulfillmentEvent for NoticeEvent {
    const TOPIC: Topic = Topic::Notice;
}

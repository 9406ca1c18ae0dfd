use async_trait::async_trait;
use common::Topic;
use domain::{FulfillmentEvent, SalesEvent};
use store::{SalesOutcome, Store};

use crate::error::{PipelineError, Result};
use crate::handler::{HandleOutcome, MessageHandler};

/// Adds sold quantities to product sales counters.
///
/// Increments are atomic at the store, so concurrent events for the same
/// product commute. Keyed events are applied at most once.
pub struct SalesHandler<S> {
    store: S,
}

impl<S: Store> SalesHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store> MessageHandler for SalesHandler<S> {
    fn topic(&self) -> Topic {
        SalesEvent::TOPIC
    }

    #[tracing::instrument(skip_all)]
    async fn handle(&self, payload: &[u8]) -> Result<HandleOutcome> {
        let event = SalesEvent::from_payload(payload)?;

        match self
            .store
            .add_sales(event.product_id, event.quantity, event.event_id)
            .await?
        {
            SalesOutcome::Applied => {
                tracing::debug!(
                    product_id = %event.product_id,
                    quantity = event.quantity,
                    "Sales recorded"
                );
                Ok(HandleOutcome::Processed)
            }
            SalesOutcome::Duplicate => Ok(HandleOutcome::Skipped("duplicate event")),
            SalesOutcome::UnknownProduct => {
                Err(PipelineError::ProductNotFound(event.product_id))
            }
        }
    }
}

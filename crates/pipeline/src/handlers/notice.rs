use async_trait::async_trait;
use common::Topic;
use domain::{FulfillmentEvent, NoticeEvent};
use store::Store;

use crate::error::{PipelineError, Result};
use crate::handler::{HandleOutcome, MessageHandler};
use crate::services::Notifier;

/// Notifies the owner of an order.
pub struct NoticeHandler<S, N> {
    store: S,
    notifier: N,
}

impl<S, N> NoticeHandler<S, N>
where
    S: Store,
    N: Notifier,
{
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }
}

#[async_trait]
impl<S, N> MessageHandler for NoticeHandler<S, N>
where
    S: Store,
    N: Notifier,
{
    fn topic(&self) -> Topic {
        NoticeEvent::TOPIC
    }

    #[tracing::instrument(skip_all)]
    async fn handle(&self, payload: &[u8]) -> Result<HandleOutcome> {
        let event = NoticeEvent::from_payload(payload)?;
        let order = self
            .store
            .get_order(event.order_id)
            .await?
            .ok_or(PipelineError::OrderNotFound(event.order_id))?;

        self.notifier.notify(order.user_id, order.order_id).await?;
        Ok(HandleOutcome::Processed)
    }
}

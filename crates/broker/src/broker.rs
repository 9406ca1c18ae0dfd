use std::time::Duration;

use async_trait::async_trait;
use common::Topic;

use crate::Result;

/// A message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned message id, used to acknowledge it.
    pub id: String,
    pub topic: Topic,
    pub payload: Vec<u8>,
}

/// A topic-based broker with consumer groups.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Read handle owned by a single consumer.
    type Subscription: Subscription;

    /// Appends a message to a topic. Returns the message id.
    async fn publish(&self, topic: Topic, payload: &[u8]) -> Result<String>;

    /// Joins `group` on `topic` as `consumer`, creating the group if needed.
    ///
    /// A new group starts from the beginning of the topic.
    async fn subscribe(
        &self,
        topic: Topic,
        group: &str,
        consumer: &str,
    ) -> Result<Self::Subscription>;

    /// Acknowledges a message so it is no longer pending for `group`.
    async fn ack(&self, topic: Topic, group: &str, id: &str) -> Result<()>;
}

/// A consumer's read side of a group.
#[async_trait]
pub trait Subscription: Send {
    /// Waits up to `wait` for the next undelivered message of the group.
    ///
    /// A fresh subscription first hands out, without waiting, the messages
    /// this consumer name was given earlier and never acknowledged.
    ///
    /// Returns None if nothing arrived in time.
    async fn next(&mut self, wait: Duration) -> Result<Option<Delivery>>;
}

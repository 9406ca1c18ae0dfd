use std::time::Duration;

use async_trait::async_trait;
use common::Topic;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};

use crate::{Broker, BrokerError, Delivery, Result, Subscription};

/// Stream field holding the message body.
const PAYLOAD_FIELD: &str = "payload";

/// Broker backed by Redis streams, one stream per topic.
#[derive(Clone)]
pub struct RedisStreamBroker {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisStreamBroker {
    /// Connects to Redis at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl Broker for RedisStreamBroker {
    type Subscription = RedisSubscription;

    #[tracing::instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn publish(&self, topic: Topic, payload: &[u8]) -> Result<String> {
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(topic.name(), "*", &[(PAYLOAD_FIELD, payload)])
            .await?;
        Ok(id)
    }

    async fn subscribe(
        &self,
        topic: Topic,
        group: &str,
        consumer: &str,
    ) -> Result<RedisSubscription> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(topic.name(), group, "0")
            .await;
        match created {
            Ok(()) => tracing::info!(%topic, group, "Created consumer group"),
            Err(e) if e.code() == Some("BUSYGROUP") => {}
            Err(e) => return Err(e.into()),
        }

        // Blocking reads get their own connection so they don't stall
        // publishes and acks queued on the shared one.
        let reader = self.client.get_multiplexed_async_connection().await?;

        Ok(RedisSubscription {
            reader,
            topic,
            group: group.to_string(),
            consumer: consumer.to_string(),
            replay_after: Some("0".to_string()),
        })
    }

    async fn ack(&self, topic: Topic, group: &str, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.xack(topic.name(), group, &[id]).await?;
        Ok(())
    }
}

/// A consumer's handle on a Redis stream consumer group.
///
/// A new subscription first walks the consumer's own pending entries list,
/// so messages delivered to an earlier incarnation of the same consumer but
/// never acknowledged are handed out again before new ones.
pub struct RedisSubscription {
    reader: MultiplexedConnection,
    topic: Topic,
    group: String,
    consumer: String,
    /// Id after which to continue reading pending entries, until they run out.
    replay_after: Option<String>,
}

impl RedisSubscription {
    /// Reads the next entry of this consumer's pending entries list.
    async fn next_pending(&mut self, after: &str) -> Result<Option<StreamId>> {
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1);
        let reply: Option<StreamReadReply> = self
            .reader
            .xread_options(&[self.topic.name()], &[after], &options)
            .await?;
        Ok(first_entry(reply))
    }

    fn delivery(&self, entry: StreamId) -> Result<Delivery> {
        let payload: Vec<u8> = entry.get(PAYLOAD_FIELD).ok_or_else(|| {
            BrokerError::MalformedMessage {
                topic: self.topic,
                id: entry.id.clone(),
            }
        })?;

        Ok(Delivery {
            id: entry.id,
            topic: self.topic,
            payload,
        })
    }
}

fn first_entry(reply: Option<StreamReadReply>) -> Option<StreamId> {
    reply
        .into_iter()
        .flat_map(|r| r.keys)
        .flat_map(|k| k.ids)
        .next()
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next(&mut self, wait: Duration) -> Result<Option<Delivery>> {
        if let Some(after) = self.replay_after.take() {
            match self.next_pending(&after).await {
                Ok(Some(entry)) => {
                    self.replay_after = Some(entry.id.clone());
                    tracing::debug!(
                        topic = %self.topic,
                        consumer = %self.consumer,
                        id = %entry.id,
                        "Replaying pending message"
                    );
                    return self.delivery(entry).map(Some);
                }
                Ok(None) => {}
                Err(e) => {
                    self.replay_after = Some(after);
                    return Err(e);
                }
            }
        }

        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1)
            .block(wait.as_millis().max(1) as usize);

        let reply: Option<StreamReadReply> = self
            .reader
            .xread_options(&[self.topic.name()], &[">"], &options)
            .await?;

        match first_entry(reply) {
            Some(entry) => self.delivery(entry).map(Some),
            None => Ok(None),
        }
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::Topic;
use tokio::sync::{Mutex, Notify};

use crate::{Broker, BrokerError, Delivery, Result, Subscription};

#[derive(Debug, Default)]
struct GroupState {
    /// Index of the next undelivered message in the topic log.
    cursor: usize,
    /// Sequence numbers delivered but not yet acknowledged, with the
    /// consumer that holds each one.
    pending: BTreeMap<u64, String>,
    acked: usize,
}

#[derive(Debug, Default)]
struct TopicLog {
    messages: Vec<(u64, Vec<u8>)>,
    groups: HashMap<String, GroupState>,
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<Topic, TopicLog>,
    next_seq: u64,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BrokerState>,
    published: Notify,
    fail_publish: AtomicBool,
    failing_fetches: AtomicUsize,
}

/// In-memory broker for testing and local runs.
///
/// Keeps a log per topic and a cursor per consumer group, which gives the
/// same delivery semantics as a Redis stream consumer group.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    /// Creates a new empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail until reset.
    pub fn set_fail_publish(&self, fail: bool) {
        self.shared.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` reads, across all subscriptions, fail.
    pub fn fail_next_fetches(&self, count: usize) {
        self.shared.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Returns the number of reads still set to fail.
    pub fn remaining_fetch_failures(&self) -> usize {
        self.shared.failing_fetches.load(Ordering::SeqCst)
    }

    /// Returns every payload published to `topic`, in order.
    pub async fn published(&self, topic: Topic) -> Vec<Vec<u8>> {
        let state = self.shared.state.lock().await;
        state
            .topics
            .get(&topic)
            .map(|log| log.messages.iter().map(|(_, p)| p.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns how many messages of `topic` `group` has acknowledged.
    pub async fn acked_count(&self, topic: Topic, group: &str) -> usize {
        let state = self.shared.state.lock().await;
        state
            .topics
            .get(&topic)
            .and_then(|log| log.groups.get(group))
            .map_or(0, |g| g.acked)
    }

    /// Returns how many messages of `topic` are delivered to `group` but not
    /// yet acknowledged.
    pub async fn pending_count(&self, topic: Topic, group: &str) -> usize {
        let state = self.shared.state.lock().await;
        state
            .topics
            .get(&topic)
            .and_then(|log| log.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Returns how many messages of `topic` `group` hasn't received yet.
    pub async fn backlog(&self, topic: Topic, group: &str) -> usize {
        let state = self.shared.state.lock().await;
        state.topics.get(&topic).map_or(0, |log| {
            let cursor = log.groups.get(group).map_or(0, |g| g.cursor);
            log.messages.len() - cursor
        })
    }
}

fn message_id(seq: u64) -> String {
    format!("{}-0", seq)
}

fn parse_message_id(id: &str) -> Option<u64> {
    id.split_once('-').and_then(|(seq, _)| seq.parse().ok())
}

#[async_trait]
impl Broker for InMemoryBroker {
    type Subscription = InMemorySubscription;

    async fn publish(&self, topic: Topic, payload: &[u8]) -> Result<String> {
        if self.shared.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("publishing disabled".into()));
        }

        let id = {
            let mut state = self.shared.state.lock().await;
            state.next_seq += 1;
            let seq = state.next_seq;
            state
                .topics
                .entry(topic)
                .or_default()
                .messages
                .push((seq, payload.to_vec()));
            message_id(seq)
        };
        self.shared.published.notify_waiters();
        Ok(id)
    }

    async fn subscribe(
        &self,
        topic: Topic,
        group: &str,
        consumer: &str,
    ) -> Result<InMemorySubscription> {
        let mut state = self.shared.state.lock().await;
        state
            .topics
            .entry(topic)
            .or_default()
            .groups
            .entry(group.to_string())
            .or_default();

        Ok(InMemorySubscription {
            shared: self.shared.clone(),
            topic,
            group: group.to_string(),
            consumer: consumer.to_string(),
            replay_after: Some(0),
        })
    }

    async fn ack(&self, topic: Topic, group: &str, id: &str) -> Result<()> {
        let Some(seq) = parse_message_id(id) else {
            return Ok(());
        };
        let mut state = self.shared.state.lock().await;
        if let Some(g) = state
            .topics
            .get_mut(&topic)
            .and_then(|log| log.groups.get_mut(group))
            && g.pending.remove(&seq).is_some()
        {
            g.acked += 1;
        }
        Ok(())
    }
}

/// A consumer's handle on an [`InMemoryBroker`] group.
#[derive(Debug)]
pub struct InMemorySubscription {
    shared: Arc<Shared>,
    topic: Topic,
    group: String,
    consumer: String,
    /// While set, messages this consumer holds unacknowledged with a higher
    /// sequence number are replayed before new ones are taken.
    replay_after: Option<u64>,
}

impl InMemorySubscription {
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    async fn try_take(&mut self) -> Option<Delivery> {
        let mut state = self.shared.state.lock().await;
        let log = state.topics.get_mut(&self.topic)?;
        let group = log.groups.entry(self.group.clone()).or_default();

        if let Some(after) = self.replay_after {
            let held = group
                .pending
                .range(after + 1..)
                .find(|(_, owner)| **owner == self.consumer)
                .map(|(seq, _)| *seq);
            match held {
                Some(seq) => {
                    self.replay_after = Some(seq);
                    let (_, payload) = log.messages.iter().find(|(s, _)| *s == seq)?;
                    return Some(Delivery {
                        id: message_id(seq),
                        topic: self.topic,
                        payload: payload.clone(),
                    });
                }
                None => self.replay_after = None,
            }
        }

        let (seq, payload) = log.messages.get(group.cursor)?.clone();
        group.cursor += 1;
        group.pending.insert(seq, self.consumer.clone());
        Some(Delivery {
            id: message_id(seq),
            topic: self.topic,
            payload,
        })
    }

    fn take_injected_failure(&self) -> bool {
        self.shared
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next(&mut self, wait: Duration) -> Result<Option<Delivery>> {
        if self.take_injected_failure() {
            return Err(BrokerError::Unavailable("injected fetch failure".into()));
        }

        let deadline = tokio::time::Instant::now() + wait;
        let shared = self.shared.clone();
        loop {
            // Register for wakeups before checking so a publish in between
            // isn't missed.
            let notified = shared.published.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_take().await {
                return Ok(Some(delivery));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}

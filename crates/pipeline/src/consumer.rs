//! Consumer pool.
//!
//! Runs a fixed number of consumer loops per topic. Each loop reads one
//! message at a time from its topic's consumer group and hands it to the
//! loop's own [`BoundedDispatcher`]. Every loop runs under a supervisor that
//! restarts it with exponential backoff if it fails, until the pool's
//! cancellation token fires.

use std::sync::Arc;
use std::time::Instant;

use broker::{Broker, Delivery, Subscription};
use common::Topic;
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::backoff::ExponentialBackoff;
use crate::config::PipelineConfig;
use crate::dispatcher::BoundedDispatcher;
use crate::handler::{HandleOutcome, MessageHandler};

/// Handle on a running set of supervised consumer loops.
pub struct ConsumerPool {
    token: CancellationToken,
    supervisors: Vec<JoinHandle<()>>,
    dispatchers: Vec<BoundedDispatcher>,
}

impl ConsumerPool {
    /// Starts `config.loops_per_topic` loops for each handler's topic.
    pub fn start<B>(
        broker: B,
        handlers: Vec<Arc<dyn MessageHandler>>,
        config: PipelineConfig,
    ) -> Self
    where
        B: Broker + Clone + 'static,
        B::Subscription: 'static,
    {
        Self::start_with_token(broker, handlers, config, CancellationToken::new())
    }

    /// Like [`start`](Self::start), stopping also when `parent` is cancelled.
    pub fn start_with_token<B>(
        broker: B,
        handlers: Vec<Arc<dyn MessageHandler>>,
        config: PipelineConfig,
        parent: CancellationToken,
    ) -> Self
    where
        B: Broker + Clone + 'static,
        B::Subscription: 'static,
    {
        let token = parent.child_token();
        let mut supervisors = Vec::new();
        let mut dispatchers = Vec::new();

        for handler in handlers {
            let topic = handler.topic();
            let group = topic.consumer_group();

            for index in 0..config.loops_per_topic {
                let dispatcher = BoundedDispatcher::new(topic, config.dispatcher_capacity);
                dispatchers.push(dispatcher.clone());

                let consumer = ConsumerLoop {
                    broker: broker.clone(),
                    handler: handler.clone(),
                    dispatcher,
                    topic,
                    group,
                    consumer: format!("{}-{}", group, index),
                    config,
                };
                supervisors.push(tokio::spawn(supervise(consumer, token.clone())));
            }
        }

        tracing::info!(
            loops = supervisors.len(),
            capacity = config.dispatcher_capacity,
            "Consumer pool started"
        );

        Self {
            token,
            supervisors,
            dispatchers,
        }
    }

    /// Returns the token that stops every loop of the pool.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns the number of supervised loops.
    pub fn loop_count(&self) -> usize {
        self.supervisors.len()
    }

    /// Returns the number of messages being handled across all loops.
    pub fn in_flight(&self) -> usize {
        self.dispatchers.iter().map(BoundedDispatcher::in_flight).sum()
    }

    /// Stops reading, then waits for every loop to exit and every in-flight
    /// message to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        join_all(self.supervisors).await;
        for dispatcher in &self.dispatchers {
            dispatcher.drain().await;
        }
        tracing::info!("Consumer pool stopped");
    }
}

#[derive(Clone)]
struct ConsumerLoop<B> {
    broker: B,
    handler: Arc<dyn MessageHandler>,
    dispatcher: BoundedDispatcher,
    topic: Topic,
    group: &'static str,
    consumer: String,
    config: PipelineConfig,
}

/// Runs a loop until cancelled, restarting it after failures and panics.
async fn supervise<B>(consumer: ConsumerLoop<B>, token: CancellationToken)
where
    B: Broker + Clone + 'static,
    B::Subscription: 'static,
{
    let mut restarts = ExponentialBackoff::new(consumer.config.backoff);

    loop {
        let started = Instant::now();
        let attempt = {
            let consumer = consumer.clone();
            let token = token.clone();
            tokio::spawn(async move { consumer.run(&token).await })
        };

        match attempt.await {
            Ok(Ok(())) => break,
            Ok(Err(e)) => {
                tracing::error!(
                    topic = %consumer.topic,
                    consumer = %consumer.consumer,
                    error = %e,
                    "Consumer loop failed"
                );
            }
            Err(e) => {
                tracing::error!(
                    topic = %consumer.topic,
                    consumer = %consumer.consumer,
                    error = %e,
                    "Consumer loop panicked"
                );
            }
        }
        if token.is_cancelled() {
            break;
        }

        if started.elapsed() >= consumer.config.backoff.max {
            restarts.reset();
        }
        let delay = restarts.next_delay();
        metrics::counter!("pipeline_loop_restarts_total", "topic" => consumer.topic.name())
            .increment(1);

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!(
        topic = %consumer.topic,
        consumer = %consumer.consumer,
        "Consumer loop stopped"
    );
}

impl<B> ConsumerLoop<B>
where
    B: Broker + Clone + 'static,
    B::Subscription: 'static,
{
    /// Reads and dispatches messages until cancelled. A read in progress
    /// when the token fires is completed and its message dispatched.
    ///
    /// Read failures are retried here with backoff; only a failure to join
    /// the group or to dispatch ends the loop with an error.
    async fn run(&self, token: &CancellationToken) -> Result<()> {
        let subscribe = self.broker.subscribe(self.topic, self.group, &self.consumer);
        let mut subscription = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            subscription = subscribe => subscription?,
        };
        tracing::debug!(
            topic = %self.topic,
            consumer = %self.consumer,
            "Consumer loop running"
        );

        let mut backoff = ExponentialBackoff::new(self.config.backoff);
        while !token.is_cancelled() {
            // Never raced against the token: once the broker has handed a
            // message over it is pending for this consumer and must reach
            // the dispatcher. The read is bounded by `poll_wait`.
            let next = subscription.next(self.config.poll_wait).await;

            match next {
                Ok(Some(delivery)) => {
                    backoff.reset();
                    self.dispatch(delivery).await?;
                }
                Ok(None) => backoff.reset(),
                Err(e) => {
                    let delay = backoff.next_delay();
                    metrics::counter!("pipeline_fetch_errors_total", "topic" => self.topic.name())
                        .increment(1);
                    tracing::warn!(
                        topic = %self.topic,
                        consumer = %self.consumer,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Failed to read message"
                    );
                    tokio::select! {
                        _ = token.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// Waits for a free permit, then handles the message on its own task.
    async fn dispatch(&self, delivery: Delivery) -> Result<()> {
        let task = process(
            self.handler.clone(),
            self.broker.clone(),
            self.group,
            delivery,
        );
        self.dispatcher.dispatch(task).await?;
        Ok(())
    }
}

/// Handles one message, records the outcome and acknowledges it.
async fn process<B: Broker>(
    handler: Arc<dyn MessageHandler>,
    broker: B,
    group: &'static str,
    delivery: Delivery,
) {
    let topic = delivery.topic;
    let started = Instant::now();

    let outcome = match handler.handle(&delivery.payload).await {
        Ok(outcome) => {
            if let HandleOutcome::Skipped(reason) = outcome {
                tracing::debug!(%topic, message_id = %delivery.id, reason, "Message skipped");
            }
            outcome.label()
        }
        Err(e) => {
            tracing::error!(
                %topic,
                message_id = %delivery.id,
                error = %e,
                "Failed to handle message"
            );
            "failed"
        }
    };

    metrics::counter!(
        "pipeline_messages_total",
        "topic" => topic.name(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("pipeline_message_duration_seconds", "topic" => topic.name())
        .record(started.elapsed().as_secs_f64());

    // Failed messages are acknowledged too; there is no retry or dead letter.
    if let Err(e) = broker.ack(topic, group, &delivery.id).await {
        tracing::warn!(
            %topic,
            message_id = %delivery.id,
            error = %e,
            "Failed to acknowledge message"
        );
    }
}

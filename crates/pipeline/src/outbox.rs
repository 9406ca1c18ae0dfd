//! Outbox relay.
//!
//! Republishes outbox rows the producer never marked as published, e.g.
//! because the broker was down when the order was placed or the process
//! stopped before the detached publish ran.

use broker::Broker;
use chrono::Utc;
use domain::{EventProducer, PublishReport};
use store::Store;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::config::OutboxConfig;

/// Periodically publishes stale outbox rows.
pub struct OutboxRelay<S, B> {
    store: S,
    producer: EventProducer<S, B>,
    config: OutboxConfig,
}

impl<S, B> OutboxRelay<S, B>
where
    S: Store + Clone + 'static,
    B: Broker + Clone + 'static,
{
    pub fn new(store: S, producer: EventProducer<S, B>, config: OutboxConfig) -> Self {
        Self {
            store,
            producer,
            config,
        }
    }

    /// Publishes one batch of rows older than the grace period.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<PublishReport> {
        let grace = chrono::Duration::from_std(self.config.grace)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let pending = self
            .store
            .pending_outbox(Utc::now() - grace, self.config.batch_size)
            .await?;

        if pending.is_empty() {
            return Ok(PublishReport::default());
        }

        let report = self.producer.publish(&pending).await;
        metrics::counter!("outbox_republished_total").increment(report.published as u64);
        tracing::info!(
            published = report.published,
            failed = report.failed,
            "Republished outbox rows"
        );
        Ok(report)
    }

    /// Scans the outbox every poll interval until cancelled.
    pub async fn run(self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::warn!(error = %e, "Outbox scan failed");
                    }
                }
            }
        }
        tracing::debug!("Outbox relay stopped");
    }

    /// Runs the relay on a background task.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }
}

//! Customer notification trait and simulated implementation.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, UserId};

use crate::error::{PipelineError, Result};

/// Trait for telling a customer about their order.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: UserId, order_id: OrderId) -> Result<()>;
}

/// Notifier that waits a fixed delay and records what it would have sent.
#[derive(Debug, Clone, Default)]
pub struct SimulatedNotifier {
    delay: Duration,
    fail: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<(UserId, OrderId)>>>,
}

impl SimulatedNotifier {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Configures the notifier to fail every call.
    pub fn set_fail_on_notify(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns every notification sent so far.
    pub fn sent(&self) -> Vec<(UserId, OrderId)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for SimulatedNotifier {
    async fn notify(&self, user_id: UserId, order_id: OrderId) -> Result<()> {
        tokio::time::sleep(self.delay).await;

        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::Notifier("delivery failed".to_string()));
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push((user_id, order_id));
        }
        tracing::info!(%user_id, %order_id, "Notification sent");
        Ok(())
    }
}

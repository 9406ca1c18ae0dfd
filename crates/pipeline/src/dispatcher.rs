//! Bounded dispatcher.
//!
//! Admits at most `capacity` concurrent handler tasks. Callers wait for a
//! free permit before the task is spawned, so a saturated dispatcher stops
//! its consumer loop from reading further messages.

use std::future::Future;
use std::sync::Arc;

use common::Topic;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::{PipelineError, Result};

/// A fixed-size pool of task permits.
#[derive(Debug, Clone)]
pub struct BoundedDispatcher {
    topic: Topic,
    capacity: usize,
    permits: Arc<Semaphore>,
}

impl BoundedDispatcher {
    pub fn new(topic: Topic, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            topic,
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of free permits.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Returns the number of tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }

    /// Waits for a permit, then runs `task` on its own tokio task.
    ///
    /// The permit is returned when the task finishes, whether it completes
    /// or panics.
    pub async fn dispatch<F>(&self, task: F) -> Result<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::DispatcherClosed)?;

        let gauge = InFlightGauge::enter(self.topic);
        Ok(tokio::spawn(async move {
            let _permit = permit;
            let _gauge = gauge;
            task.await;
        }))
    }

    /// Waits until every running task has finished.
    pub async fn drain(&self) {
        // Holding every permit at once means nothing is in flight.
        if let Ok(all) = self.permits.acquire_many(self.capacity as u32).await {
            drop(all);
        }
    }
}

/// Keeps `pipeline_in_flight{topic}` in step with running tasks.
struct InFlightGauge(Topic);

impl InFlightGauge {
    fn enter(topic: Topic) -> Self {
        metrics::gauge!("pipeline_in_flight", "topic" => topic.name()).increment(1.0);
        Self(topic)
    }
}

impl Drop for InFlightGauge {
    fn drop(&mut self) {
        metrics::gauge!("pipeline_in_flight", "topic" => self.0.name()).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_permits_track_running_tasks() {
        let dispatcher = BoundedDispatcher::new(Topic::Payment, 2);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = dispatcher
            .dispatch(async move {
                let _ = rx.await;
            })
            .await
            .unwrap();
        assert_eq!(dispatcher.in_flight(), 1);
        assert_eq!(dispatcher.available(), 1);

        tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_saturated_dispatch_waits() {
        let dispatcher = BoundedDispatcher::new(Topic::Sales, 1);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        dispatcher
            .dispatch(async move {
                let _ = rx.await;
            })
            .await
            .unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(30),
            dispatcher.dispatch(async {}),
        )
        .await;
        assert!(blocked.is_err());

        tx.send(()).unwrap();
        dispatcher.drain().await;
        assert_eq!(dispatcher.available(), 1);
    }

    #[tokio::test]
    async fn test_panicking_task_releases_permit() {
        let dispatcher = BoundedDispatcher::new(Topic::Notice, 1);
        let handle = dispatcher
            .dispatch(async { panic!("handler blew up") })
            .await
            .unwrap();
        assert!(handle.await.is_err());
        assert_eq!(dispatcher.available(), 1);
    }

    #[tokio::test]
    async fn test_peak_concurrency_is_bounded() {
        let dispatcher = BoundedDispatcher::new(Topic::Payment, 50);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..200 {
            let current = current.clone();
            let peak = peak.clone();
            dispatcher
                .dispatch(async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
        }
        dispatcher.drain().await;

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 50, "peak concurrency {peak} exceeded capacity");
        assert!(peak > 1);
        assert_eq!(current.load(Ordering::SeqCst), 0);
    }
}

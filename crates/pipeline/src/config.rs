use std::time::Duration;

/// Settings for the consumer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Consumer loops started for each topic.
    pub loops_per_topic: usize,
    /// Messages a single loop may have in flight.
    pub dispatcher_capacity: usize,
    /// How long a single broker read waits for a message.
    pub poll_wait: Duration,
    pub backoff: BackoffConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            loops_per_topic: 6,
            dispatcher_capacity: 50,
            poll_wait: Duration::from_secs(1),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Delay bounds for retrying failed reads and restarting failed loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(30),
        }
    }
}

/// Settings for the outbox relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboxConfig {
    /// Time between scans of the outbox.
    pub poll_interval: Duration,
    /// Minimum age of a row before the relay republishes it. Younger rows
    /// are left to the producer that wrote them.
    pub grace: Duration,
    /// Maximum rows republished per scan.
    pub batch_size: usize,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            grace: Duration::from_secs(10),
            batch_size: 100,
        }
    }
}

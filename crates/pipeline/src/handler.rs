use async_trait::async_trait;
use common::Topic;

use crate::Result;

/// How a handler disposed of a message it didn't fail on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The message changed state.
    Processed,
    /// The message was valid but had nothing left to do.
    Skipped(&'static str),
}

impl HandleOutcome {
    /// Label used for the `outcome` metric dimension.
    pub fn label(&self) -> &'static str {
        match self {
            HandleOutcome::Processed => "processed",
            HandleOutcome::Skipped(_) => "skipped",
        }
    }
}

/// Processes the messages of one topic.
///
/// Handlers run concurrently and may see the same message more than once, in
/// any order, so every state change they make goes through an atomic store
/// operation.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// The topic this handler consumes.
    fn topic(&self) -> Topic;

    /// Handles one raw message payload.
    async fn handle(&self, payload: &[u8]) -> Result<HandleOutcome>;
}

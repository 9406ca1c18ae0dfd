//! Shared types for the marketplace fulfillment pipeline.
//!
//! Every other crate in the workspace speaks in these identifiers, so they live
//! at the bottom of the dependency graph.

pub mod money;
pub mod topic;
pub mod types;

pub use money::Money;
pub use topic::Topic;
pub use types::{AddressId, OrderId, ParseIdError, ProductId, UserId};

//! Message broker abstraction.
//!
//! Producers publish opaque payloads to a [`Topic`](common::Topic). Consumers
//! join a named group; every message of a topic is delivered to one member of
//! each group and stays pending for that group until acknowledged.

pub mod broker;
pub mod error;
pub mod memory;
pub mod redis_stream;

pub use broker::{Broker, Delivery, Subscription};
pub use error::{BrokerError, Result};
pub use memory::{InMemoryBroker, InMemorySubscription};
pub use redis_stream::{RedisStreamBroker, RedisSubscription};

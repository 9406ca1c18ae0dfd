//! Cart cache.
//!
//! Holds one hash per user (`cart:<user_id>`, product id → quantity) with a
//! time-to-live. The cache is never authoritative: an absent key is always a
//! valid state and sends readers back to the primary store.

pub mod cart;
pub mod error;
pub mod memory;
pub mod redis_cache;

pub use cart::{CartCache, CartEntries, cart_key};
pub use error::{CacheError, Result};
pub use memory::InMemoryCartCache;
pub use redis_cache::RedisCartCache;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use common::{ProductId, UserId};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::{CartCache, CartEntries, Result, cart_key};

// Both scripts are no-ops on an absent key. See `CartCache`.
const INCREMENT_IF_CACHED: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    local quantity = redis.call('HINCRBY', KEYS[1], ARGV[1], ARGV[2])
    redis.call('EXPIRE', KEYS[1], ARGV[3])
    return quantity
end
return false
";

const SET_IF_CACHED: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
    redis.call('EXPIRE', KEYS[1], ARGV[3])
    return 1
end
return 0
";

/// Redis-backed cart cache storing one hash per user.
#[derive(Clone)]
pub struct RedisCartCache {
    conn: ConnectionManager,
    increment_script: redis::Script,
    set_script: redis::Script,
}

impl RedisCartCache {
    /// Connects to Redis at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    /// Creates a cache over an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            increment_script: redis::Script::new(INCREMENT_IF_CACHED),
            set_script: redis::Script::new(SET_IF_CACHED),
        }
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}

fn parse_entries(user_id: UserId, raw: HashMap<String, String>) -> CartEntries {
    raw.into_iter()
        .filter_map(|(field, value)| {
            match (field.parse::<ProductId>(), value.parse::<i64>()) {
                (Ok(product_id), Ok(quantity)) => Some((product_id, quantity)),
                _ => {
                    tracing::warn!(%user_id, %field, %value, "Skipping unparsable cart field");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl CartCache for RedisCartCache {
    #[tracing::instrument(skip(self))]
    async fn get_cart(&self, user_id: UserId) -> Result<CartEntries> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(cart_key(user_id)).await?;
        Ok(parse_entries(user_id, raw))
    }

    #[tracing::instrument(skip(self, entries), fields(fields = entries.len()))]
    async fn replace_cart(
        &self,
        user_id: UserId,
        entries: &[(ProductId, i64)],
        ttl: Duration,
    ) -> Result<()> {
        let key = cart_key(user_id);
        let mut conn = self.conn.clone();

        if entries.is_empty() {
            let _: () = conn.del(&key).await?;
            return Ok(());
        }

        let fields: Vec<(String, i64)> = entries
            .iter()
            .map(|(product_id, quantity)| (product_id.to_string(), *quantity))
            .collect();

        let _: () = redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .hset_multiple(&key, &fields)
            .ignore()
            .expire(&key, ttl_secs(ttl))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn increment(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: i64,
        ttl: Duration,
    ) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let quantity: Option<i64> = self
            .increment_script
            .key(cart_key(user_id))
            .arg(product_id.to_string())
            .arg(delta)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(quantity)
    }

    #[tracing::instrument(skip(self))]
    async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
        ttl: Duration,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let applied: i64 = self
            .set_script
            .key(cart_key(user_id))
            .arg(product_id.to_string())
            .arg(quantity)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(applied == 1)
    }

    #[tracing::instrument(skip(self))]
    async fn remove(&self, user_id: UserId, product_id: ProductId, ttl: Duration) -> Result<()> {
        let key = cart_key(user_id);
        let mut conn = self.conn.clone();
        // EXPIRE is a no-op once HDEL has emptied the hash and Redis dropped it.
        let _: () = redis::pipe()
            .atomic()
            .hdel(&key, product_id.to_string())
            .ignore()
            .expire(&key, ttl_secs(ttl))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

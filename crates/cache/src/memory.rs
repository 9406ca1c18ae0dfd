use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::{ProductId, UserId};
use tokio::sync::RwLock;

use crate::{CacheError, CartCache, CartEntries, Result};

#[derive(Debug, Clone)]
struct CachedCart {
    entries: CartEntries,
    expires_at: Instant,
}

impl CachedCart {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory cart cache for testing and local runs.
///
/// Expiry is checked lazily on access. Reads and writes can be made to fail
/// to exercise the fallback paths of callers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartCache {
    carts: Arc<RwLock<HashMap<UserId, CachedCart>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
}

impl InMemoryCartCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent read fail until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Drops a user's cart as if its TTL had elapsed.
    pub async fn expire(&self, user_id: UserId) {
        self.carts.write().await.remove(&user_id);
    }

    /// Returns the remaining TTL of a user's cart, if it is cached.
    pub async fn ttl(&self, user_id: UserId) -> Option<Duration> {
        let now = Instant::now();
        self.carts
            .read()
            .await
            .get(&user_id)
            .filter(|cart| cart.is_live(now))
            .map(|cart| cart.expires_at - now)
    }

    /// Returns true if the user's cart is cached and not expired.
    pub async fn contains(&self, user_id: UserId) -> bool {
        self.ttl(user_id).await.is_some()
    }

    /// Returns the number of `get_cart` calls made so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }

    /// Returns the live cart for `user_id`, evicting it if it has expired.
    fn live_cart<'a>(
        carts: &'a mut HashMap<UserId, CachedCart>,
        user_id: UserId,
    ) -> Option<&'a mut CachedCart> {
        let now = Instant::now();
        if carts.get(&user_id).is_some_and(|cart| !cart.is_live(now)) {
            carts.remove(&user_id);
        }
        carts.get_mut(&user_id)
    }
}

#[async_trait]
impl CartCache for InMemoryCartCache {
    async fn get_cart(&self, user_id: UserId) -> Result<CartEntries> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("reads disabled".into()));
        }

        let now = Instant::now();
        let carts = self.carts.read().await;
        Ok(carts
            .get(&user_id)
            .filter(|cart| cart.is_live(now))
            .map(|cart| cart.entries.clone())
            .unwrap_or_default())
    }

    async fn replace_cart(
        &self,
        user_id: UserId,
        entries: &[(ProductId, i64)],
        ttl: Duration,
    ) -> Result<()> {
        self.check_writes()?;

        let mut carts = self.carts.write().await;
        if entries.is_empty() {
            carts.remove(&user_id);
            return Ok(());
        }
        carts.insert(
            user_id,
            CachedCart {
                entries: entries.iter().copied().collect(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn increment(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: i64,
        ttl: Duration,
    ) -> Result<Option<i64>> {
        self.check_writes()?;

        let mut carts = self.carts.write().await;
        let Some(cart) = Self::live_cart(&mut carts, user_id) else {
            return Ok(None);
        };
        let quantity = cart.entries.entry(product_id).or_insert(0);
        *quantity = quantity.saturating_add(delta);
        let quantity = *quantity;
        cart.expires_at = Instant::now() + ttl;
        Ok(Some(quantity))
    }

    async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
        ttl: Duration,
    ) -> Result<bool> {
        self.check_writes()?;

        let mut carts = self.carts.write().await;
        let Some(cart) = Self::live_cart(&mut carts, user_id) else {
            return Ok(false);
        };
        cart.entries.insert(product_id, quantity);
        cart.expires_at = Instant::now() + ttl;
        Ok(true)
    }

    async fn remove(
        &self,
        user_id: UserId,
        product_id: ProductId,
        ttl: Duration,
    ) -> Result<()> {
        self.check_writes()?;

        let mut carts = self.carts.write().await;
        if let Some(cart) = Self::live_cart(&mut carts, user_id) {
            cart.entries.remove(&product_id);
            if cart.entries.is_empty() {
                carts.remove(&user_id);
            } else {
                cart.expires_at = Instant::now() + ttl;
            }
        }
        Ok(())
    }
}

//! Cart reads and writes with the cache in front of the store.
//!
//! The store is authoritative. Reads try the cache first and fall back to the
//! store join on a miss, repopulating the cache off the request path. Writes
//! go to the store first; the cache update that follows is best effort and
//! its failures are only logged.

use std::fmt::Display;

use cache::CartCache;
use common::{ProductId, UserId};
use store::{CartLine, Store};

use crate::error::{DomainError, Result};

use super::CartConfig;

/// Largest quantity a single cart write may carry.
pub const MAX_CART_QUANTITY: i64 = i32::MAX as i64;

/// Service for reading and editing shopping carts.
#[derive(Clone)]
pub struct CartService<S, C> {
    store: S,
    cache: C,
    config: CartConfig,
}

impl<S, C> CartService<S, C>
where
    S: Store + Clone + 'static,
    C: CartCache + Clone + 'static,
{
    pub fn new(store: S, cache: C, config: CartConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &CartConfig {
        &self.config
    }

    /// Returns the user's cart lines.
    ///
    /// A non-empty cached cart is served from the cache plus a batch product
    /// lookup. Anything else runs the store join.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart_items(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        match self.cache.get_cart(user_id).await {
            Ok(cached) if !cached.is_empty() => {
                metrics::counter!("cart_cache_hits_total").increment(1);

                let ids: Vec<ProductId> = cached.keys().copied().collect();
                let mut products = self.store.products_by_ids(&ids).await?;
                products.sort_by_key(|p| p.product_id);

                // Products missing from the catalogue are dropped.
                return Ok(products
                    .iter()
                    .filter_map(|p| {
                        cached
                            .get(&p.product_id)
                            .map(|quantity| CartLine::from_product(p, *quantity))
                    })
                    .collect());
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "Cart cache read failed, using store");
            }
        }

        metrics::counter!("cart_cache_misses_total").increment(1);
        let lines = self.store.cart_lines(user_id).await?;

        if !lines.is_empty() {
            self.spawn_populate(user_id, &lines);
        }
        Ok(lines)
    }

    /// Adds `quantity` of a product to the cart. Non-positive quantities
    /// count as one; quantities above [`MAX_CART_QUANTITY`] are rejected.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<()> {
        validate_ids(user_id, product_id)?;
        let quantity = if quantity <= 0 { 1 } else { quantity };
        validate_upper_bound(quantity)?;
        self.require_product(product_id).await?;

        self.store
            .upsert_cart_item(user_id, product_id, quantity)
            .await?;

        let cached = self
            .cache
            .increment(user_id, product_id, quantity, self.config.write_ttl)
            .await;
        log_cache_write("increment", user_id, product_id, cached);
        Ok(())
    }

    /// Removes a product from the cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_cart_item(&self, user_id: UserId, product_id: ProductId) -> Result<()> {
        validate_ids(user_id, product_id)?;
        self.require_product(product_id).await?;

        let removed = self.store.delete_cart_item(user_id, product_id).await?;
        tracing::debug!(removed, "Deleted cart rows");

        let cached = self
            .cache
            .remove(user_id, product_id, self.config.write_ttl)
            .await;
        log_cache_write("remove", user_id, product_id, cached);
        Ok(())
    }

    /// Sets the quantity of a product already in the cart.
    #[tracing::instrument(skip(self))]
    pub async fn update_cart_item_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<()> {
        validate_ids(user_id, product_id)?;
        if quantity <= 0 {
            return Err(DomainError::validation(
                "quantity",
                format!("must be positive, got {}", quantity),
            ));
        }
        validate_upper_bound(quantity)?;
        self.require_product(product_id).await?;

        let updated = self
            .store
            .set_cart_item_quantity(user_id, product_id, quantity)
            .await?;
        if updated == 0 {
            return Err(DomainError::CartItemNotFound {
                user_id,
                product_id,
            });
        }

        let cached = self
            .cache
            .set_quantity(user_id, product_id, quantity, self.config.write_ttl)
            .await;
        log_cache_write("set", user_id, product_id, cached);
        Ok(())
    }

    async fn require_product(&self, product_id: ProductId) -> Result<()> {
        match self.store.get_product(product_id).await? {
            Some(_) => Ok(()),
            None => Err(DomainError::ProductNotFound(product_id)),
        }
    }

    fn spawn_populate(&self, user_id: UserId, lines: &[CartLine]) {
        let entries: Vec<(ProductId, i64)> = lines
            .iter()
            .map(|line| (line.product_id, line.quantity))
            .collect();
        let cache = self.cache.clone();
        let ttl = self.config.read_ttl;

        tokio::spawn(async move {
            if let Err(e) = cache.replace_cart(user_id, &entries, ttl).await {
                metrics::counter!("cart_cache_write_failures_total").increment(1);
                tracing::warn!(%user_id, error = %e, "Failed to populate cart cache");
            }
        });
    }
}

fn validate_ids(user_id: UserId, product_id: ProductId) -> Result<()> {
    if user_id.is_zero() {
        return Err(DomainError::validation("user_id", "must be non-zero"));
    }
    if product_id.is_zero() {
        return Err(DomainError::validation("product_id", "must be non-zero"));
    }
    Ok(())
}

fn validate_upper_bound(quantity: i64) -> Result<()> {
    if quantity > MAX_CART_QUANTITY {
        return Err(DomainError::validation(
            "quantity",
            format!("must be at most {}, got {}", MAX_CART_QUANTITY, quantity),
        ));
    }
    Ok(())
}

fn log_cache_write<T: std::fmt::Debug, E: Display>(
    op: &'static str,
    user_id: UserId,
    product_id: ProductId,
    result: std::result::Result<T, E>,
) {
    match result {
        Ok(outcome) => {
            tracing::debug!(op, %user_id, %product_id, ?outcome, "Cart cache updated");
        }
        Err(e) => {
            metrics::counter!("cart_cache_write_failures_total", "op" => op).increment(1);
            tracing::warn!(op, %user_id, %product_id, error = %e, "Cart cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use cache::InMemoryCartCache;
    use common::Money;
    use store::{InMemoryStore, Product};

    const USER: UserId = UserId::new(7);
    const TEA: ProductId = ProductId::new(101);
    const MUG: ProductId = ProductId::new(102);

    async fn setup() -> (
        CartService<InMemoryStore, InMemoryCartCache>,
        InMemoryStore,
        InMemoryCartCache,
    ) {
        let store = InMemoryStore::new();
        store
            .insert_product(Product::new(TEA, "Tea", Money::from_cents(999)))
            .await;
        store
            .insert_product(Product::new(MUG, "Mug", Money::from_cents(1000)))
            .await;
        let cache = InMemoryCartCache::new();
        let service = CartService::new(store.clone(), cache.clone(), CartConfig::default());
        (service, store, cache)
    }

    /// Waits for the detached cache populate to land.
    async fn wait_for_cache(cache: &InMemoryCartCache, user_id: UserId) {
        for _ in 0..100 {
            if cache.contains(user_id).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("cart cache was never populated");
    }

    #[tokio::test]
    async fn test_miss_runs_join_and_populates() {
        let (service, store, cache) = setup().await;
        store.upsert_cart_item(USER, TEA, 2).await.unwrap();
        store.upsert_cart_item(USER, MUG, 1).await.unwrap();

        let lines = service.get_cart_items(USER).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(store.cart_join_queries(), 1);

        wait_for_cache(&cache, USER).await;
        let ttl = cache.ttl(USER).await.unwrap();
        assert!(ttl <= Duration::from_secs(24 * 3600));
        assert!(ttl > Duration::from_secs(23 * 3600));

        let again = service.get_cart_items(USER).await.unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(store.cart_join_queries(), 1);
    }

    #[tokio::test]
    async fn test_hit_serves_cached_quantities() {
        let (service, store, cache) = setup().await;
        cache
            .replace_cart(USER, &[(TEA, 2), (MUG, 1)], Duration::from_secs(60))
            .await
            .unwrap();

        let lines = service.get_cart_items(USER).await.unwrap();
        assert_eq!(store.cart_join_queries(), 0);
        assert_eq!(lines.len(), 2);
        assert_eq!((lines[0].product_id, lines[0].quantity), (TEA, 2));
        assert_eq!((lines[1].product_id, lines[1].quantity), (MUG, 1));
        assert_eq!(lines[0].product_name, "Tea");
        assert!(lines[0].cart_id.is_none());
    }

    #[tokio::test]
    async fn test_hit_drops_unknown_products() {
        let (service, _, cache) = setup().await;
        cache
            .replace_cart(
                USER,
                &[(TEA, 2), (ProductId::new(999), 4)],
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let lines = service.get_cart_items(USER).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, TEA);
    }

    #[tokio::test]
    async fn test_cache_read_failure_falls_back_to_store() {
        let (service, store, cache) = setup().await;
        store.upsert_cart_item(USER, TEA, 3).await.unwrap();
        cache.set_fail_reads(true);

        let lines = service.get_cart_items(USER).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(store.cart_join_queries(), 1);
    }

    #[tokio::test]
    async fn test_empty_cart_is_not_cached() {
        let (service, _, cache) = setup().await;
        assert!(service.get_cart_items(USER).await.unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!cache.contains(USER).await);
    }

    #[tokio::test]
    async fn test_add_defaults_quantity_and_updates_cached_cart() {
        let (service, store, cache) = setup().await;
        cache
            .replace_cart(USER, &[(TEA, 1)], Duration::from_secs(60))
            .await
            .unwrap();

        service.add_to_cart(USER, TEA, 0).await.unwrap();
        service.add_to_cart(USER, TEA, 3).await.unwrap();

        let cached = cache.get_cart(USER).await.unwrap();
        assert_eq!(cached[&TEA], 5);
        assert!(cache.ttl(USER).await.unwrap() > Duration::from_secs(24 * 3600));

        let rows = store.cart_lines(USER).await.unwrap();
        assert_eq!(rows[0].quantity, 4);
    }

    #[tokio::test]
    async fn test_quantity_above_bound_rejected() {
        let (service, store, _) = setup().await;

        let err = service.add_to_cart(USER, TEA, i64::MAX).await.unwrap_err();
        assert!(err.is_validation());
        service.add_to_cart(USER, TEA, 1).await.unwrap();

        store.upsert_cart_item(USER, MUG, 1).await.unwrap();
        assert!(service
            .update_cart_item_quantity(USER, MUG, MAX_CART_QUANTITY + 1)
            .await
            .unwrap_err()
            .is_validation());

        let rows = store.cart_lines(USER).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.quantity == 1));
    }

    #[tokio::test]
    async fn test_repeated_maximum_adds_accumulate() {
        let (service, store, _) = setup().await;

        service
            .add_to_cart(USER, TEA, MAX_CART_QUANTITY)
            .await
            .unwrap();
        service
            .add_to_cart(USER, TEA, MAX_CART_QUANTITY)
            .await
            .unwrap();

        let rows = store.cart_lines(USER).await.unwrap();
        assert_eq!(rows[0].quantity, 2 * MAX_CART_QUANTITY);
    }

    #[tokio::test]
    async fn test_add_unknown_product_fails() {
        let (service, _, _) = setup().await;
        let err = service
            .add_to_cart(USER, ProductId::new(999), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_zero_ids_rejected() {
        let (service, _, _) = setup().await;
        assert!(service
            .add_to_cart(UserId::new(0), TEA, 1)
            .await
            .unwrap_err()
            .is_validation());
        assert!(service
            .remove_cart_item(USER, ProductId::new(0))
            .await
            .unwrap_err()
            .is_validation());
    }

    #[tokio::test]
    async fn test_cache_write_failure_does_not_fail_and_converges() {
        let (service, store, cache) = setup().await;
        cache.set_fail_writes(true);

        service.add_to_cart(USER, TEA, 3).await.unwrap();

        cache.set_fail_writes(false);
        let lines = service.get_cart_items(USER).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(store.cart_join_queries(), 1);
    }

    #[tokio::test]
    async fn test_update_quantity() {
        let (service, store, cache) = setup().await;
        store.upsert_cart_item(USER, TEA, 1).await.unwrap();
        cache
            .replace_cart(USER, &[(TEA, 1)], Duration::from_secs(60))
            .await
            .unwrap();

        service.update_cart_item_quantity(USER, TEA, 6).await.unwrap();
        assert_eq!(cache.get_cart(USER).await.unwrap()[&TEA], 6);
        assert_eq!(store.cart_lines(USER).await.unwrap()[0].quantity, 6);

        assert!(service
            .update_cart_item_quantity(USER, TEA, 0)
            .await
            .unwrap_err()
            .is_validation());

        let err = service
            .update_cart_item_quantity(USER, MUG, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::CartItemNotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_item() {
        let (service, store, cache) = setup().await;
        store.upsert_cart_item(USER, TEA, 1).await.unwrap();
        store.upsert_cart_item(USER, MUG, 1).await.unwrap();
        cache
            .replace_cart(USER, &[(TEA, 1), (MUG, 1)], Duration::from_secs(60))
            .await
            .unwrap();

        service.remove_cart_item(USER, TEA).await.unwrap();

        let lines = service.get_cart_items(USER).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, MUG);
        assert_eq!(store.cart_lines(USER).await.unwrap().len(), 1);
    }
}

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use common::{ProductId, UserId};

use crate::Result;

/// Cached quantities of one user's cart, keyed by product.
pub type CartEntries = HashMap<ProductId, i64>;

/// Returns the cache key holding a user's cart hash.
pub fn cart_key(user_id: UserId) -> String {
    format!("cart:{}", user_id)
}

/// A hash-per-user cart cache with key expiry.
///
/// Write operations only touch a cart that is already cached. Creating a hash
/// from a single write would leave a partial cart that later reads take for
/// a hit, so an absent key stays absent until a full read repopulates it.
#[async_trait]
pub trait CartCache: Send + Sync {
    /// Returns every field of the user's cart hash.
    ///
    /// An absent or expired key yields an empty map. Fields that don't parse
    /// as `product id → quantity` are skipped.
    async fn get_cart(&self, user_id: UserId) -> Result<CartEntries>;

    /// Replaces the user's cart hash with `entries` and sets its TTL.
    ///
    /// Empty `entries` just clears the key.
    async fn replace_cart(
        &self,
        user_id: UserId,
        entries: &[(ProductId, i64)],
        ttl: Duration,
    ) -> Result<()>;

    /// Adds `delta` to a product's cached quantity and refreshes the TTL.
    ///
    /// Returns the new quantity, or None if the cart isn't cached.
    async fn increment(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: i64,
        ttl: Duration,
    ) -> Result<Option<i64>>;

    /// Overwrites a product's cached quantity and refreshes the TTL.
    ///
    /// Returns false if the cart isn't cached.
    async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
        ttl: Duration,
    ) -> Result<bool>;

    /// Removes a product from the cached cart and refreshes the TTL of what
    /// remains. Removing the last product drops the key.
    async fn remove(&self, user_id: UserId, product_id: ProductId, ttl: Duration) -> Result<()>;
}

//! Redis integration tests
//!
//! These tests start a Redis container and need a Docker daemon.
//! Run with:
//!
//! ```bash
//! cargo test -p cache --test redis_integration -- --ignored
//! ```

use std::time::Duration;

use cache::{CartCache, RedisCartCache};
use common::{ProductId, UserId};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;

const DAY: Duration = Duration::from_secs(86400);

async fn start() -> (ContainerAsync<Redis>, RedisCartCache) {
    let container = Redis::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(6379).await.unwrap();
    let cache = RedisCartCache::connect(&format!("redis://{}:{}", host, port))
        .await
        .unwrap();
    (container, cache)
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn cart_hash_lifecycle() {
    let (_container, cache) = start().await;
    let user = UserId::new(7);
    let tea = ProductId::new(101);
    let mug = ProductId::new(102);

    assert!(cache.get_cart(user).await.unwrap().is_empty());
    assert_eq!(cache.increment(user, tea, 1, DAY).await.unwrap(), None);
    assert!(cache.get_cart(user).await.unwrap().is_empty());

    cache
        .replace_cart(user, &[(tea, 2), (mug, 1)], DAY)
        .await
        .unwrap();
    assert_eq!(cache.increment(user, tea, 3, DAY).await.unwrap(), Some(5));
    assert!(cache.set_quantity(user, mug, 4, DAY).await.unwrap());

    let cart = cache.get_cart(user).await.unwrap();
    assert_eq!(cart[&tea], 5);
    assert_eq!(cart[&mug], 4);

    cache.remove(user, tea, DAY).await.unwrap();
    let cart = cache.get_cart(user).await.unwrap();
    assert_eq!(cart.len(), 1);

    cache.remove(user, mug, DAY).await.unwrap();
    assert!(cache.get_cart(user).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn remove_refreshes_ttl() {
    let (_container, cache) = start().await;
    let user = UserId::new(9);
    let tea = ProductId::new(101);
    let mug = ProductId::new(102);

    cache
        .replace_cart(user, &[(tea, 1), (mug, 2)], Duration::from_secs(1))
        .await
        .unwrap();
    cache.remove(user, tea, DAY).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let cart = cache.get_cart(user).await.unwrap();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[&mug], 2);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn cart_key_expires() {
    let (_container, cache) = start().await;
    let user = UserId::new(8);

    cache
        .replace_cart(user, &[(ProductId::new(101), 1)], Duration::from_secs(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(cache.get_cart(user).await.unwrap().is_empty());
}

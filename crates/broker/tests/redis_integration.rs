//! Redis stream integration tests
//!
//! These tests start a Redis container and need a Docker daemon.
//! Run with:
//!
//! ```bash
//! cargo test -p broker --test redis_integration -- --ignored
//! ```

use std::time::Duration;

use broker::{Broker, RedisStreamBroker, Subscription};
use common::Topic;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;

const WAIT: Duration = Duration::from_millis(200);

async fn start() -> (ContainerAsync<Redis>, RedisStreamBroker) {
    let container = Redis::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(6379).await.unwrap();
    let broker = RedisStreamBroker::connect(&format!("redis://{}:{}", host, port))
        .await
        .unwrap();
    (container, broker)
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn published_messages_reach_one_group_member() {
    let (_container, broker) = start().await;

    broker.publish(Topic::Payment, b"{\"order_id\":1}").await.unwrap();
    broker.publish(Topic::Payment, b"{\"order_id\":2}").await.unwrap();

    let mut a = broker
        .subscribe(Topic::Payment, "payment-group", "a")
        .await
        .unwrap();
    let mut b = broker
        .subscribe(Topic::Payment, "payment-group", "b")
        .await
        .unwrap();

    let first = a.next(WAIT).await.unwrap().unwrap();
    let second = b.next(WAIT).await.unwrap().unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(first.payload, b"{\"order_id\":1}");

    broker
        .ack(Topic::Payment, "payment-group", &first.id)
        .await
        .unwrap();
    broker
        .ack(Topic::Payment, "payment-group", &second.id)
        .await
        .unwrap();

    assert!(a.next(WAIT).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn resubscribing_reuses_the_group() {
    let (_container, broker) = start().await;

    broker.subscribe(Topic::Sales, "sales-group", "a").await.unwrap();
    let mut again = broker
        .subscribe(Topic::Sales, "sales-group", "a")
        .await
        .unwrap();

    broker.publish(Topic::Sales, b"x").await.unwrap();
    assert!(again.next(WAIT).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn unacknowledged_messages_are_replayed_to_the_same_consumer() {
    let (_container, broker) = start().await;

    broker.publish(Topic::Notice, b"first").await.unwrap();
    broker.publish(Topic::Notice, b"second").await.unwrap();

    let mut a = broker
        .subscribe(Topic::Notice, "notice-group", "notice-group-0")
        .await
        .unwrap();
    let lost = a.next(WAIT).await.unwrap().unwrap();
    // The reply was read but the consumer went away before acking.
    drop(a);

    let mut restarted = broker
        .subscribe(Topic::Notice, "notice-group", "notice-group-0")
        .await
        .unwrap();
    let replayed = restarted.next(WAIT).await.unwrap().unwrap();
    assert_eq!(replayed.id, lost.id);
    assert_eq!(replayed.payload, b"first");

    let fresh = restarted.next(WAIT).await.unwrap().unwrap();
    assert_eq!(fresh.payload, b"second");

    for id in [&replayed.id, &fresh.id] {
        broker.ack(Topic::Notice, "notice-group", id).await.unwrap();
    }
    let mut again = broker
        .subscribe(Topic::Notice, "notice-group", "notice-group-0")
        .await
        .unwrap();
    assert!(again.next(WAIT).await.unwrap().is_none());
}

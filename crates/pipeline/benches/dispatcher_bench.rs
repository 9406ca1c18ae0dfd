use std::time::Duration;

use broker::{Broker, InMemoryBroker, Subscription};
use common::{Money, ProductId, Topic};
use criterion::{Criterion, criterion_group, criterion_main};
use pipeline::{BoundedDispatcher, MessageHandler, SalesHandler};
use store::{InMemoryStore, Product};

fn bench_dispatch_200_tasks(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("dispatcher/dispatch_200_tasks", |b| {
        b.iter(|| {
            rt.block_on(async {
                let dispatcher = BoundedDispatcher::new(Topic::Notice, 50);
                for _ in 0..200 {
                    dispatcher
                        .dispatch(async { tokio::task::yield_now().await })
                        .await
                        .unwrap();
                }
                dispatcher.drain().await;
            });
        });
    });
}

fn bench_sales_handler(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    rt.block_on(
        store.insert_product(Product::new(ProductId::new(101), "Tea", Money::from_cents(999))),
    );
    let handler = SalesHandler::new(store);

    c.bench_function("handlers/sales_unkeyed", |b| {
        b.iter(|| {
            rt.block_on(async {
                handler
                    .handle(br#"{"product_id":101,"quantity":2}"#)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_broker_publish_and_read(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("broker/memory_publish_read_ack_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let broker = InMemoryBroker::new();
                let group = Topic::Sales.consumer_group();
                let mut subscription = broker
                    .subscribe(Topic::Sales, group, "bench-0")
                    .await
                    .unwrap();
                for _ in 0..100 {
                    broker.publish(Topic::Sales, b"{}").await.unwrap();
                }
                while let Some(delivery) = subscription.next(Duration::ZERO).await.unwrap() {
                    broker.ack(Topic::Sales, group, &delivery.id).await.unwrap();
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_dispatch_200_tasks,
    bench_sales_handler,
    bench_broker_publish_and_read
);
criterion_main!(benches);


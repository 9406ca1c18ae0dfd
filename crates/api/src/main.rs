//! API server entry point.
//!
//! Wires the store, cache and broker chosen by configuration, starts the
//! consumer pool and the outbox relay, and serves HTTP until a shutdown
//! signal arrives.

use std::sync::Arc;

use api::AppState;
use api::config::Config;
use broker::{Broker, InMemoryBroker, RedisStreamBroker};
use cache::{CartCache, InMemoryCartCache, RedisCartCache};
use common::{Money, ProductId};
use domain::EventProducer;
use metrics_exporter_prometheus::PrometheusHandle;
use pipeline::{
    ConsumerPool, OutboxRelay, SimulatedNotifier, SimulatedPaymentGateway, fulfillment_handlers,
};
use store::{InMemoryStore, PostgresStore, Product, Store};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the primary store
    match config.database_url.clone() {
        Some(url) => {
            let store = PostgresStore::connect(&url, config.database_max_connections)
                .await
                .expect("failed to connect to PostgreSQL");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            with_store(config, store, metrics_handle).await;
        }
        None => {
            let store = InMemoryStore::new();
            seed_catalogue(&store).await;
            tracing::info!("using in-memory store");
            with_store(config, store, metrics_handle).await;
        }
    }
}

/// Demo products so a local in-memory run can take orders and carts.
async fn seed_catalogue(store: &InMemoryStore) {
    for (id, name, cents) in [(101, "Tea", 999), (102, "Mug", 1000), (103, "Kettle", 4500)] {
        store
            .insert_product(Product::new(ProductId::new(id), name, Money::from_cents(cents)))
            .await;
    }
}

/// Picks the cache and broker, both Redis-backed or both in memory.
async fn with_store<S>(config: Config, store: S, metrics_handle: PrometheusHandle)
where
    S: Store + Clone + 'static,
{
    match config.redis_url.clone() {
        Some(url) => {
            let cache = RedisCartCache::connect(&url)
                .await
                .expect("failed to connect the cart cache to Redis");
            let broker = RedisStreamBroker::connect(&url)
                .await
                .expect("failed to connect the broker to Redis");
            tracing::info!("using Redis cache and broker");
            serve(config, store, cache, broker, metrics_handle).await;
        }
        None => {
            tracing::info!("using in-memory cache and broker");
            serve(
                config,
                store,
                InMemoryCartCache::new(),
                InMemoryBroker::new(),
                metrics_handle,
            )
            .await;
        }
    }
}

async fn serve<S, C, B>(
    config: Config,
    store: S,
    cache: C,
    broker: B,
    metrics_handle: PrometheusHandle,
) where
    S: Store + Clone + 'static,
    C: CartCache + Clone + 'static,
    B: Broker + Clone + 'static,
    B::Subscription: 'static,
{
    let shutdown = CancellationToken::new();

    // 4. Start the fulfillment pipeline
    let handlers = fulfillment_handlers(
        store.clone(),
        SimulatedPaymentGateway::new(config.payment_delay),
        SimulatedNotifier::new(config.notice_delay),
    );
    let pool = ConsumerPool::start_with_token(
        broker.clone(),
        handlers,
        config.pipeline(),
        shutdown.clone(),
    );
    let relay = OutboxRelay::new(
        store.clone(),
        EventProducer::new(store.clone(), broker.clone()),
        config.outbox(),
    )
    .spawn(shutdown.clone());

    // 5. Build the application
    let state = Arc::new(AppState::new(store, cache, broker, config.cart()));
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Drain the pipeline
    pool.shutdown().await;
    shutdown.cancel();
    if let Err(e) = relay.await {
        tracing::warn!(error = %e, "outbox relay task failed");
    }

    tracing::info!("server shut down gracefully");
}

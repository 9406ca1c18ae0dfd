//! HTTP adapter for the marketplace fulfillment pipeline.
//!
//! Exposes order placement and cart endpoints over the domain services,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use broker::Broker;
use cache::CartCache;
use domain::{CartConfig, CartService, EventProducer, OrderService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S, C, B> {
    pub orders: OrderService<S, B>,
    pub carts: CartService<S, C>,
}

impl<S, C, B> AppState<S, C, B>
where
    S: Store + Clone + 'static,
    C: CartCache + Clone + 'static,
    B: Broker + Clone + 'static,
{
    /// Wires the order and cart services over shared backend handles.
    pub fn new(store: S, cache: C, broker: B, cart_config: CartConfig) -> Self {
        let producer = EventProducer::new(store.clone(), broker);
        Self {
            orders: OrderService::new(store.clone(), producer),
            carts: CartService::new(store, cache, cart_config),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, C, B>(
    state: Arc<AppState<S, C, B>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    S: Store + Clone + 'static,
    C: CartCache + Clone + 'static,
    B: Broker + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::create::<S, C, B>).get(routes::orders::list::<S, C, B>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S, C, B>))
        .route("/orders/{id}/pay", post(routes::orders::pay::<S, C, B>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S, C, B>))
        .route("/carts/{user_id}", get(routes::carts::list::<S, C, B>))
        .route(
            "/carts/{user_id}/items",
            post(routes::carts::add_item::<S, C, B>),
        )
        .route(
            "/carts/{user_id}/items/{product_id}",
            put(routes::carts::update_item::<S, C, B>)
                .delete(routes::carts::remove_item::<S, C, B>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

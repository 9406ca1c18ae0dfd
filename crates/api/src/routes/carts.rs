//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use broker::Broker;
use cache::CartCache;
use common::{ProductId, UserId};
use serde::Deserialize;
use store::{CartLine, Store};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: u64,
    /// Missing or non-positive quantities add one unit.
    #[serde(default)]
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i64,
}

/// GET /carts/{user_id}
#[tracing::instrument(skip(state))]
pub async fn list<S, C, B>(
    State(state): State<Arc<AppState<S, C, B>>>,
    Path(user_id): Path<u64>,
) -> Result<Json<Vec<CartLine>>, ApiError>
where
    S: Store + Clone + 'static,
    C: CartCache + Clone + 'static,
    B: Broker + Clone + 'static,
{
    let lines = state.carts.get_cart_items(UserId::new(user_id)).await?;
    Ok(Json(lines))
}

/// POST /carts/{user_id}/items
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S, C, B>(
    State(state): State<Arc<AppState<S, C, B>>>,
    Path(user_id): Path<u64>,
    Json(req): Json<AddItemRequest>,
) -> Result<StatusCode, ApiError>
where
    S: Store + Clone + 'static,
    C: CartCache + Clone + 'static,
    B: Broker + Clone + 'static,
{
    state
        .carts
        .add_to_cart(
            UserId::new(user_id),
            ProductId::new(req.product_id),
            req.quantity,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /carts/{user_id}/items/{product_id}
#[tracing::instrument(skip(state, req))]
pub async fn update_item<S, C, B>(
    State(state): State<Arc<AppState<S, C, B>>>,
    Path((user_id, product_id)): Path<(u64, u64)>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<StatusCode, ApiError>
where
    S: Store + Clone + 'static,
    C: CartCache + Clone + 'static,
    B: Broker + Clone + 'static,
{
    state
        .carts
        .update_cart_item_quantity(
            UserId::new(user_id),
            ProductId::new(product_id),
            req.quantity,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /carts/{user_id}/items/{product_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S, C, B>(
    State(state): State<Arc<AppState<S, C, B>>>,
    Path((user_id, product_id)): Path<(u64, u64)>,
) -> Result<StatusCode, ApiError>
where
    S: Store + Clone + 'static,
    C: CartCache + Clone + 'static,
    B: Broker + Clone + 'static,
{
    state
        .carts
        .remove_cart_item(UserId::new(user_id), ProductId::new(product_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Order placement, payment, lookup and cancellation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use broker::Broker;
use cache::CartCache;
use common::{AddressId, Money, OrderId, UserId};
use domain::{CreateOrderInput, OrderDetails, OrderItemInput, OrderReceipt, PaymentRequest};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::AppState;
use crate::error::ApiError;

/// Body of `POST /orders`.
///
/// Products and quantities come as two parallel arrays; the total is a
/// decimal amount.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: u64,
    #[serde(alias = "totalPrice")]
    pub total_price: f64,
    #[serde(default)]
    pub address_id: Option<u64>,
    pub product_ids: Vec<u64>,
    pub product_quantities: Vec<i64>,
}

impl CreateOrderRequest {
    fn into_input(self) -> Result<CreateOrderInput, ApiError> {
        if self.product_ids.len() != self.product_quantities.len() {
            return Err(ApiError::BadRequest(format!(
                "{} product ids but {} quantities",
                self.product_ids.len(),
                self.product_quantities.len()
            )));
        }
        if !self.total_price.is_finite() {
            return Err(ApiError::BadRequest("total_price is not a number".into()));
        }

        Ok(CreateOrderInput {
            user_id: UserId::new(self.user_id),
            total_price: Money::from_decimal(self.total_price),
            address_id: self.address_id.map(AddressId::new),
            items: self
                .product_ids
                .into_iter()
                .zip(self.product_quantities)
                .map(|(product_id, quantity)| OrderItemInput::new(product_id, quantity))
                .collect(),
        })
    }
}

/// POST /orders: places an order and returns before fulfillment runs.
#[tracing::instrument(skip(state, req))]
pub async fn create<S, C, B>(
    State(state): State<Arc<AppState<S, C, B>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderReceipt>), ApiError>
where
    S: Store + Clone + 'static,
    C: CartCache + Clone + 'static,
    B: Broker + Clone + 'static,
{
    let receipt = state.orders.create_order(req.into_input()?).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Query of `GET /orders`.
#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub user_id: u64,
}

/// Body returned by `POST /orders/{id}/pay`.
#[derive(Debug, Serialize)]
pub struct PayOrderResponse {
    pub order_id: OrderId,
    #[serde(flatten)]
    pub request: PaymentRequest,
}

/// GET /orders?user_id=: the user's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S, C, B>(
    State(state): State<Arc<AppState<S, C, B>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderDetails>>, ApiError>
where
    S: Store + Clone + 'static,
    C: CartCache + Clone + 'static,
    B: Broker + Clone + 'static,
{
    let orders = state.orders.list_orders(UserId::new(query.user_id)).await?;
    Ok(Json(orders))
}

/// POST /orders/{id}/pay: republishes the payment event of an unpaid order.
///
/// Answers 202 when a payment event went out and 200 when the order was
/// already settled.
#[tracing::instrument(skip(state))]
pub async fn pay<S, C, B>(
    State(state): State<Arc<AppState<S, C, B>>>,
    Path(id): Path<u64>,
) -> Result<(StatusCode, Json<PayOrderResponse>), ApiError>
where
    S: Store + Clone + 'static,
    C: CartCache + Clone + 'static,
    B: Broker + Clone + 'static,
{
    let order_id = OrderId::new(id);
    let request = state.orders.pay_order(order_id).await?;
    let status = match request {
        PaymentRequest::Submitted => StatusCode::ACCEPTED,
        PaymentRequest::AlreadySettled { .. } => StatusCode::OK,
    };
    Ok((status, Json(PayOrderResponse { order_id, request })))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S, C, B>(
    State(state): State<Arc<AppState<S, C, B>>>,
    Path(id): Path<u64>,
) -> Result<Json<OrderDetails>, ApiError>
where
    S: Store + Clone + 'static,
    C: CartCache + Clone + 'static,
    B: Broker + Clone + 'static,
{
    let order = state
        .orders
        .get_order(OrderId::new(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(order))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<S, C, B>(
    State(state): State<Arc<AppState<S, C, B>>>,
    Path(id): Path<u64>,
) -> Result<Json<OrderDetails>, ApiError>
where
    S: Store + Clone + 'static,
    C: CartCache + Clone + 'static,
    B: Broker + Clone + 'static,
{
    let order = state.orders.cancel_order(OrderId::new(id)).await?;
    Ok(Json(order))
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use mealkit_core::{Delivery, LineItemDetail, Order, OrderDetails, OrderStatus};
use mealkit_order::CheckoutRequest;

use crate::error::AppError;
use crate::extract::ApiJson;
use crate::middleware::auth::Claims;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
}

pub(crate) fn parse_order_status(raw: Option<&str>) -> Result<Option<OrderStatus>, AppError> {
    raw.map(|s| s.parse::<OrderStatus>())
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/complete", post(complete_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/meals", get(get_order_meals))
        .route("/orders/{id}/delivery", get(get_order_delivery))
        .route("/orders/{id}/cancel", post(cancel_order))
}

/// POST /orders
/// Places a pending cart order. When `shipping` is included the order is
/// confirmed and its delivery scheduled, as with `/orders/complete`.
async fn create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderDetails>), AppError> {
    let details = state.fulfillment.checkout(claims.sub, req).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// POST /orders/complete
/// Places a confirmed order and schedules its delivery.
async fn complete_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderDetails>), AppError> {
    if req.shipping.is_none() {
        return Err(AppError::Validation("shipping details are required".into()));
    }
    let details = state.fulfillment.checkout(claims.sub, req).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

async fn list_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let status = parse_order_status(query.status.as_deref())?;
    let orders = state.fulfillment.orders_for(claims.sub, status).await?;
    Ok(Json(orders))
}

async fn get_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderDetails>, AppError> {
    let details = state.fulfillment.order_details(claims.scope(), order_id).await?;
    Ok(Json(details))
}

async fn get_order_meals(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<LineItemDetail>>, AppError> {
    let lines = state.fulfillment.order_lines(claims.scope(), order_id).await?;
    Ok(Json(lines))
}

async fn get_order_delivery(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = state.fulfillment.order_delivery(claims.scope(), order_id).await?;
    Ok(Json(delivery))
}

/// POST /orders/{id}/cancel
/// Stock for every line goes back on the shelf.
async fn cancel_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderDetails>, AppError> {
    let details = state.fulfillment.cancel_order(claims.scope(), order_id).await?;
    Ok(Json(details))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{patch, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use mealkit_core::{Delivery, DeliveryStatus, ShippingInfo};

use crate::error::AppError;
use crate::extract::ApiJson;
use crate::middleware::auth::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDeliveryRequest {
    pub order_id: Uuid,
    #[serde(flatten)]
    pub recipient: ShippingInfo,
    #[serde(default)]
    pub estimated_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDeliveryStatusRequest {
    pub status: DeliveryStatus,
    #[serde(default)]
    pub estimated_time: Option<DateTime<Utc>>,
}

/// Customer-facing delivery routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/delivery", post(create_delivery))
}

/// Status changes are restricted to admins.
pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/delivery/order/{order_id}/status", patch(update_delivery_status))
}

async fn create_delivery(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateDeliveryRequest>,
) -> Result<(StatusCode, Json<Delivery>), AppError> {
    let delivery = state
        .fulfillment
        .create_delivery(claims.scope(), req.order_id, req.recipient, req.estimated_time)
        .await?;
    Ok((StatusCode::CREATED, Json(delivery)))
}

async fn update_delivery_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateDeliveryStatusRequest>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = state
        .fulfillment
        .advance_delivery(order_id, req.status, req.estimated_time)
        .await?;
    Ok(Json(delivery))
}

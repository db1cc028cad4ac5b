use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mealkit_core::stats::{
    CustomerTotals, DashboardStats, DateRange, DeliveryStatistics, ItemPopularity, OrderFilter,
    PopularityFilter,
};
use mealkit_core::{Delivery, DeliveryStatus, InventoryItem, Order, OrderStatus};

use crate::error::AppError;
use crate::extract::ApiJson;
use crate::orders::parse_order_status;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl RangeQuery {
    fn range(&self) -> DateRange {
        DateRange {
            from: self.from,
            to: self.to,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TopMealsQuery {
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveriesQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    pub threshold: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct DeliveriesResponse {
    pub deliveries: Vec<Delivery>,
    pub statistics: DeliveryStatistics,
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/orders", get(list_orders))
        .route("/admin/orders/{id}/status", patch(update_order_status))
        .route("/admin/stats", get(dashboard))
        .route("/admin/meals/top", get(top_meals))
        .route("/admin/customers", get(customers))
        .route("/admin/deliveries", get(deliveries))
        .route("/admin/inventory/low-stock", get(low_stock))
        .route("/admin/inventory/{id}/restock", post(restock))
}

// ============================================================================
// Orders
// ============================================================================

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let filter = OrderFilter {
        status: parse_order_status(query.status.as_deref())?,
        range: DateRange {
            from: query.from,
            to: query.to,
        },
        limit: query.limit,
    };
    let orders = state.reporting.orders(&filter).await?;
    Ok(Json(orders))
}

async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state.fulfillment.advance_order(order_id, req.status).await?;
    Ok(Json(order))
}

// ============================================================================
// Statistics
// ============================================================================

async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<DashboardStats>, AppError> {
    let stats = state.reporting.dashboard(&query.range()).await?;
    Ok(Json(stats))
}

async fn top_meals(
    State(state): State<AppState>,
    Query(query): Query<TopMealsQuery>,
) -> Result<Json<Vec<ItemPopularity>>, AppError> {
    let filter = PopularityFilter {
        range: DateRange {
            from: query.from,
            to: query.to,
        },
        status: parse_order_status(query.status.as_deref())?,
        limit: Some(query.limit.unwrap_or(10)),
    };
    let items = state.reporting.popular_items(&filter).await?;
    Ok(Json(items))
}

async fn customers(State(state): State<AppState>) -> Result<Json<Vec<CustomerTotals>>, AppError> {
    let totals = state.reporting.customer_totals().await?;
    Ok(Json(totals))
}

async fn deliveries(
    State(state): State<AppState>,
    Query(query): Query<DeliveriesQuery>,
) -> Result<Json<DeliveriesResponse>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<DeliveryStatus>)
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let deliveries = state.reporting.deliveries(status).await?;
    let statistics = state.reporting.delivery_statistics().await?;
    Ok(Json(DeliveriesResponse {
        deliveries,
        statistics,
    }))
}

// ============================================================================
// Inventory
// ============================================================================

async fn low_stock(
    State(state): State<AppState>,
    Query(query): Query<LowStockQuery>,
) -> Result<Json<Vec<InventoryItem>>, AppError> {
    let items = state.reporting.low_stock(query.threshold).await?;
    Ok(Json(items))
}

async fn restock(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    ApiJson(req): ApiJson<RestockRequest>,
) -> Result<Json<InventoryItem>, AppError> {
    let item = state.reporting.restock(item_id, req.quantity).await?;
    Ok(Json(item))
}

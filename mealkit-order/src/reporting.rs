use tracing::info;
use uuid::Uuid;

use mealkit_core::stats::{
    CustomerTotals, DashboardStats, DateRange, DeliveryStatistics, ItemPopularity, OrderFilter,
    OrderStatistics, PopularityFilter,
};
use mealkit_core::{Delivery, DeliveryStatus, InventoryItem, Order, Role, StoreSet};

use crate::error::{FulfillmentError, FulfillmentResult};

/// Read-side aggregates for the admin surface plus inventory upkeep.
#[derive(Clone)]
pub struct ReportingService {
    stores: StoreSet,
    low_stock_threshold: i32,
}

impl ReportingService {
    pub fn new(stores: StoreSet, low_stock_threshold: i32) -> Self {
        Self {
            stores,
            low_stock_threshold,
        }
    }

    pub async fn dashboard(&self, range: &DateRange) -> FulfillmentResult<DashboardStats> {
        let total_users = self.stores.accounts.count_by_role(Role::User).await?;
        let orders = self.stores.orders.statistics().await?;
        let total_revenue_cents = self.stores.orders.total_revenue(range).await?;

        Ok(DashboardStats {
            total_users,
            total_orders: orders.total_orders,
            average_order_value_cents: orders.average_order_value_cents,
            total_revenue_cents,
        })
    }

    pub async fn orders(&self, filter: &OrderFilter) -> FulfillmentResult<Vec<Order>> {
        if filter.limit.is_some_and(|limit| limit <= 0) {
            return Err(FulfillmentError::Validation("limit must be positive".into()));
        }
        Ok(self.stores.orders.list_all(filter).await?)
    }

    pub async fn order_statistics(&self) -> FulfillmentResult<OrderStatistics> {
        Ok(self.stores.orders.statistics().await?)
    }

    pub async fn deliveries(&self, status: Option<DeliveryStatus>) -> FulfillmentResult<Vec<Delivery>> {
        Ok(self.stores.deliveries.list_all(status).await?)
    }

    pub async fn delivery_statistics(&self) -> FulfillmentResult<DeliveryStatistics> {
        Ok(self.stores.deliveries.statistics().await?)
    }

    pub async fn popular_items(&self, filter: &PopularityFilter) -> FulfillmentResult<Vec<ItemPopularity>> {
        if filter.limit.is_some_and(|limit| limit <= 0) {
            return Err(FulfillmentError::Validation("limit must be positive".into()));
        }
        Ok(self.stores.line_items.popularity_stats(filter).await?)
    }

    pub async fn customer_totals(&self) -> FulfillmentResult<Vec<CustomerTotals>> {
        Ok(self.stores.orders.customer_totals().await?)
    }

    /// Active items at or below `threshold`, or the configured threshold.
    pub async fn low_stock(&self, threshold: Option<i32>) -> FulfillmentResult<Vec<InventoryItem>> {
        let threshold = threshold.unwrap_or(self.low_stock_threshold);
        if threshold < 0 {
            return Err(FulfillmentError::Validation("threshold must not be negative".into()));
        }
        Ok(self.stores.inventory.low_stock(threshold).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn restock(&self, item_id: Uuid, delta: i32) -> FulfillmentResult<InventoryItem> {
        let item = self.stores.inventory.restock(item_id, delta).await?;
        info!(item_id = %item.id, quantity = item.quantity, "item restocked");
        Ok(item)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    Account, Delivery, DeliveryStatus, InventoryItem, LineItem, LineItemDetail, NewAccount,
    NewDelivery, NewInventoryItem, NewLineItem, Order, OrderStatus, Plan, Role,
};
use crate::stats::{
    CustomerTotals, DateRange, DeliveryStatistics, InventoryFilter, ItemPopularity, OrderFilter,
    OrderStatistics, PopularityFilter,
};
use crate::StoreResult;

/// Repository trait for meal-kit stock
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn create_item(&self, item: &NewInventoryItem) -> StoreResult<InventoryItem>;

    async fn get_item(&self, id: Uuid) -> StoreResult<Option<InventoryItem>>;

    /// Advisory read. Unknown or inactive items are never available.
    async fn check_available(&self, id: Uuid, required: i32) -> StoreResult<bool>;

    /// Single conditional write: succeeds only while `quantity >= requested`.
    async fn decrement(&self, id: Uuid, quantity: i32) -> StoreResult<InventoryItem>;

    async fn restock(&self, id: Uuid, delta: i32) -> StoreResult<InventoryItem>;

    async fn update_price(&self, id: Uuid, price_cents: i64) -> StoreResult<InventoryItem>;

    async fn list_items(&self, filter: &InventoryFilter) -> StoreResult<Vec<InventoryItem>>;

    async fn low_stock(&self, threshold: i32) -> StoreResult<Vec<InventoryItem>>;
}

/// Repository trait for order headers
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(
        &self,
        owner_id: Uuid,
        total_cents: i64,
        status: OrderStatus,
        payment_method: Option<&str>,
    ) -> StoreResult<Order>;

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Order>>;

    async fn get_by_id_for_owner(&self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Order>>;

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        status: Option<OrderStatus>,
    ) -> StoreResult<Vec<Order>>;

    /// Compare-and-set against the transition table.
    async fn update_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Order>;

    async fn list_all(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;

    async fn statistics(&self) -> StoreResult<OrderStatistics>;

    /// Revenue over delivered orders.
    async fn total_revenue(&self, range: &DateRange) -> StoreResult<i64>;

    async fn customer_totals(&self) -> StoreResult<Vec<CustomerTotals>>;
}

/// Repository trait for the order/meal junction
#[async_trait]
pub trait LineItemStore: Send + Sync {
    async fn add_item(&self, order_id: Uuid, item: &NewLineItem) -> StoreResult<LineItem>;

    /// All rows or none.
    async fn add_items(&self, order_id: Uuid, items: &[NewLineItem]) -> StoreResult<Vec<LineItem>>;

    async fn get_by_order(&self, order_id: Uuid) -> StoreResult<Vec<LineItemDetail>>;

    async fn sum_for_order(&self, order_id: Uuid) -> StoreResult<i64>;

    async fn popularity_stats(&self, filter: &PopularityFilter) -> StoreResult<Vec<ItemPopularity>>;
}

/// Repository trait for delivery records
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn create(&self, order_id: Uuid, delivery: &NewDelivery) -> StoreResult<Delivery>;

    async fn get_by_order(&self, order_id: Uuid) -> StoreResult<Option<Delivery>>;

    async fn update_status(
        &self,
        order_id: Uuid,
        status: DeliveryStatus,
        estimated_time: Option<DateTime<Utc>>,
    ) -> StoreResult<Delivery>;

    async fn list_all(&self, status: Option<DeliveryStatus>) -> StoreResult<Vec<Delivery>>;

    async fn statistics(&self) -> StoreResult<DeliveryStatistics>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_account(&self, account: &NewAccount) -> StoreResult<Account>;

    async fn get_account(&self, id: Uuid) -> StoreResult<Option<Account>>;

    async fn count_by_role(&self, role: Role) -> StoreResult<i64>;

    async fn create_plan(&self, owner_id: Uuid, tier: &str, expires_on: NaiveDate) -> StoreResult<Plan>;
}

/// Opens a transaction spanning every fulfillment table.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn FulfillmentTx>>;
}

/// Writes issued through one unit of work become visible together on `commit`.
/// Dropping the handle without committing discards them.
#[async_trait]
pub trait FulfillmentTx: Send {
    async fn get_item(&mut self, id: Uuid) -> StoreResult<Option<InventoryItem>>;

    async fn decrement(&mut self, id: Uuid, quantity: i32) -> StoreResult<InventoryItem>;

    async fn restock(&mut self, id: Uuid, delta: i32) -> StoreResult<InventoryItem>;

    async fn create_order(
        &mut self,
        owner_id: Uuid,
        total_cents: i64,
        status: OrderStatus,
        payment_method: Option<&str>,
    ) -> StoreResult<Order>;

    async fn get_order(&mut self, id: Uuid) -> StoreResult<Option<Order>>;

    async fn update_order_status(&mut self, id: Uuid, status: OrderStatus) -> StoreResult<Order>;

    async fn add_line_items(
        &mut self,
        order_id: Uuid,
        items: &[NewLineItem],
    ) -> StoreResult<Vec<LineItem>>;

    async fn line_items(&mut self, order_id: Uuid) -> StoreResult<Vec<LineItemDetail>>;

    async fn sum_for_order(&mut self, order_id: Uuid) -> StoreResult<i64>;

    async fn create_delivery(&mut self, order_id: Uuid, delivery: &NewDelivery) -> StoreResult<Delivery>;

    async fn get_delivery(&mut self, order_id: Uuid) -> StoreResult<Option<Delivery>>;

    async fn update_delivery_status(
        &mut self,
        order_id: Uuid,
        status: DeliveryStatus,
        estimated_time: Option<DateTime<Utc>>,
    ) -> StoreResult<Delivery>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Every store a backend provides, shared behind `Arc`s.
#[derive(Clone)]
pub struct StoreSet {
    pub inventory: Arc<dyn InventoryStore>,
    pub orders: Arc<dyn OrderStore>,
    pub line_items: Arc<dyn LineItemStore>,
    pub deliveries: Arc<dyn DeliveryStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub unit_of_work: Arc<dyn UnitOfWork>,
}

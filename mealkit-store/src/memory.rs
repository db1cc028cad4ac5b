use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use mealkit_core::repository::{
    AccountStore, DeliveryStore, FulfillmentTx, InventoryStore, LineItemStore, OrderStore,
    UnitOfWork,
};
use mealkit_core::stats::{
    rounded_mean, CustomerTotals, DateRange, DeliveryStatistics, InventoryFilter, ItemPopularity,
    OrderFilter, OrderStatistics, PopularityFilter,
};
use mealkit_core::{
    Account, Delivery, DeliveryStatus, InventoryItem, LineItem, LineItemDetail, NewAccount,
    NewDelivery, NewInventoryItem, NewLineItem, Order, OrderStatus, Plan, Role, StoreError,
    StoreResult, StoreSet,
};

use crate::line_item_repo::check_batch;

/// Every table of the in-memory backend. Rows are kept in insertion order so
/// "newest first" is a reverse scan.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    items: HashMap<Uuid, InventoryItem>,
    orders: Vec<Order>,
    lines: Vec<LineItem>,
    deliveries: Vec<Delivery>,
    accounts: Vec<Account>,
    plans: Vec<Plan>,
}

impl MemoryState {
    fn insert_item(&mut self, item: &NewInventoryItem) -> StoreResult<InventoryItem> {
        item.validate()?;
        let now = Utc::now();
        let row = InventoryItem {
            id: Uuid::new_v4(),
            name: item.name.clone(),
            description: item.description.clone(),
            quantity: item.quantity,
            price_cents: item.price_cents,
            category: item.category.clone(),
            dietary_tags: item.dietary_tags.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.items.insert(row.id, row.clone());
        Ok(row)
    }

    fn item(&self, id: Uuid) -> Option<InventoryItem> {
        self.items.get(&id).cloned()
    }

    fn item_mut(&mut self, id: Uuid) -> StoreResult<&mut InventoryItem> {
        self.items
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("inventory item", id))
    }

    fn decrement(&mut self, id: Uuid, quantity: i32) -> StoreResult<InventoryItem> {
        if quantity <= 0 {
            return Err(StoreError::Validation(format!(
                "decrement quantity must be positive, got {}",
                quantity
            )));
        }

        let item = self.item_mut(id)?;
        if !item.can_supply(quantity) {
            return Err(StoreError::InsufficientStock {
                item_id: id,
                requested: quantity,
                available: if item.is_active { item.quantity } else { 0 },
            });
        }
        item.quantity -= quantity;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    fn restock(&mut self, id: Uuid, delta: i32) -> StoreResult<InventoryItem> {
        if delta <= 0 {
            return Err(StoreError::Validation(format!(
                "restock delta must be positive, got {}",
                delta
            )));
        }

        let item = self.item_mut(id)?;
        item.quantity = item
            .quantity
            .checked_add(delta)
            .ok_or_else(|| StoreError::Integrity(format!("stock for item {} would overflow", id)))?;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    fn insert_order(
        &mut self,
        owner_id: Uuid,
        total_cents: i64,
        status: OrderStatus,
        payment_method: Option<&str>,
    ) -> StoreResult<Order> {
        if total_cents < 0 {
            return Err(StoreError::Validation("order total must not be negative".into()));
        }

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            owner_id,
            total_cents,
            status,
            payment_method: payment_method.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        self.orders.push(order.clone());
        Ok(order)
    }

    fn order(&self, id: Uuid) -> Option<Order> {
        self.orders.iter().find(|o| o.id == id).cloned()
    }

    fn set_order_status(&mut self, id: Uuid, status: OrderStatus) -> StoreResult<Order> {
        let order = self
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::not_found("order", id))?;

        order.status = order.status.transition(status)?;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    fn insert_lines(&mut self, order_id: Uuid, items: &[NewLineItem]) -> StoreResult<Vec<LineItem>> {
        check_batch(items)?;

        if self.order(order_id).is_none() {
            return Err(StoreError::not_found("order", order_id));
        }
        for item in items {
            if !self.items.contains_key(&item.item_id) {
                return Err(StoreError::not_found("inventory item", item.item_id));
            }
            if self
                .lines
                .iter()
                .any(|l| l.order_id == order_id && l.item_id == item.item_id)
            {
                return Err(StoreError::Conflict(format!(
                    "order {} already contains item {}",
                    order_id, item.item_id
                )));
            }
        }

        let lines: Vec<LineItem> = items
            .iter()
            .map(|item| LineItem {
                order_id,
                item_id: item.item_id,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
            })
            .collect();
        self.lines.extend(lines.iter().cloned());
        Ok(lines)
    }

    fn line_details(&self, order_id: Uuid) -> Vec<LineItemDetail> {
        let mut details: Vec<LineItemDetail> = self
            .lines
            .iter()
            .filter(|l| l.order_id == order_id)
            .filter_map(|l| {
                self.items.get(&l.item_id).map(|item| LineItemDetail {
                    line: l.clone(),
                    name: item.name.clone(),
                    current_price_cents: item.price_cents,
                })
            })
            .collect();
        details.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.line.item_id.cmp(&b.line.item_id))
        });
        details
    }

    fn sum_lines(&self, order_id: Uuid) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.order_id == order_id)
            .map(LineItem::subtotal_cents)
            .sum()
    }

    fn insert_delivery(&mut self, order_id: Uuid, delivery: &NewDelivery) -> StoreResult<Delivery> {
        delivery.recipient.validate()?;

        if self.order(order_id).is_none() {
            return Err(StoreError::not_found("order", order_id));
        }
        if self.deliveries.iter().any(|d| d.order_id == order_id) {
            return Err(StoreError::Conflict(format!(
                "order {} already has a delivery",
                order_id
            )));
        }

        let now = Utc::now();
        let row = Delivery {
            id: Uuid::new_v4(),
            order_id,
            status: delivery.status,
            estimated_time: delivery.estimated_time,
            recipient: delivery.recipient.clone(),
            created_at: now,
            updated_at: now,
        };
        self.deliveries.push(row.clone());
        Ok(row)
    }

    fn delivery(&self, order_id: Uuid) -> Option<Delivery> {
        self.deliveries.iter().find(|d| d.order_id == order_id).cloned()
    }

    fn set_delivery_status(
        &mut self,
        order_id: Uuid,
        status: DeliveryStatus,
        estimated_time: Option<DateTime<Utc>>,
    ) -> StoreResult<Delivery> {
        let delivery = self
            .deliveries
            .iter_mut()
            .find(|d| d.order_id == order_id)
            .ok_or_else(|| StoreError::not_found("delivery", order_id))?;

        delivery.status = delivery.status.transition(status)?;
        if estimated_time.is_some() {
            delivery.estimated_time = estimated_time;
        }
        delivery.updated_at = Utc::now();
        Ok(delivery.clone())
    }
}

/// In-process backend for tests and local runs. Every call takes the state
/// lock; a unit of work holds it until commit or rollback.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stores(&self) -> StoreSet {
        let store = Arc::new(self.clone());
        StoreSet {
            inventory: store.clone(),
            orders: store.clone(),
            line_items: store.clone(),
            deliveries: store.clone(),
            accounts: store.clone(),
            unit_of_work: store,
        }
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn create_item(&self, item: &NewInventoryItem) -> StoreResult<InventoryItem> {
        self.state.lock().await.insert_item(item)
    }

    async fn get_item(&self, id: Uuid) -> StoreResult<Option<InventoryItem>> {
        Ok(self.state.lock().await.item(id))
    }

    async fn check_available(&self, id: Uuid, required: i32) -> StoreResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .item(id)
            .is_some_and(|item| item.can_supply(required)))
    }

    async fn decrement(&self, id: Uuid, quantity: i32) -> StoreResult<InventoryItem> {
        self.state.lock().await.decrement(id, quantity)
    }

    async fn restock(&self, id: Uuid, delta: i32) -> StoreResult<InventoryItem> {
        self.state.lock().await.restock(id, delta)
    }

    async fn update_price(&self, id: Uuid, price_cents: i64) -> StoreResult<InventoryItem> {
        if price_cents < 0 {
            return Err(StoreError::Validation("price must not be negative".into()));
        }
        let mut state = self.state.lock().await;
        let item = state.item_mut(id)?;
        item.price_cents = price_cents;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn list_items(&self, filter: &InventoryFilter) -> StoreResult<Vec<InventoryItem>> {
        let state = self.state.lock().await;
        let mut items: Vec<InventoryItem> = state
            .items
            .values()
            .filter(|i| i.is_active)
            .filter(|i| filter.category.is_none() || i.category == filter.category)
            .filter(|i| filter.max_price_cents.map_or(true, |max| i.price_cents <= max))
            .filter(|i| filter.min_price_cents.map_or(true, |min| i.price_cents >= min))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn low_stock(&self, threshold: i32) -> StoreResult<Vec<InventoryItem>> {
        let state = self.state.lock().await;
        let mut items: Vec<InventoryItem> = state
            .items
            .values()
            .filter(|i| i.is_active && i.quantity <= threshold)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.quantity.cmp(&b.quantity).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create(
        &self,
        owner_id: Uuid,
        total_cents: i64,
        status: OrderStatus,
        payment_method: Option<&str>,
    ) -> StoreResult<Order> {
        self.state
            .lock()
            .await
            .insert_order(owner_id, total_cents, status, payment_method)
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.state.lock().await.order(id))
    }

    async fn get_by_id_for_owner(&self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self
            .state
            .lock()
            .await
            .order(id)
            .filter(|o| o.owner_id == owner_id))
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        status: Option<OrderStatus>,
    ) -> StoreResult<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|o| o.owner_id == owner_id)
            .filter(|o| status.map_or(true, |s| o.status == s))
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Order> {
        self.state.lock().await.set_order_status(id, status)
    }

    async fn list_all(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let state = self.state.lock().await;
        let matching = state
            .orders
            .iter()
            .rev()
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .filter(|o| filter.range.contains(o.created_at))
            .cloned();

        Ok(match filter.limit {
            Some(limit) => matching.take(usize::try_from(limit).unwrap_or(0)).collect(),
            None => matching.collect(),
        })
    }

    async fn statistics(&self) -> StoreResult<OrderStatistics> {
        let state = self.state.lock().await;
        let mut stats = OrderStatistics {
            total_orders: state.orders.len() as i64,
            ..Default::default()
        };
        let mut sum = 0i64;
        for order in &state.orders {
            sum += order.total_cents;
            match order.status {
                OrderStatus::Pending => stats.pending_orders += 1,
                OrderStatus::Confirmed => stats.confirmed_orders += 1,
                OrderStatus::Delivered => stats.delivered_orders += 1,
                OrderStatus::Cancelled => stats.cancelled_orders += 1,
            }
        }
        stats.average_order_value_cents = rounded_mean(sum, stats.total_orders);
        Ok(stats)
    }

    async fn total_revenue(&self, range: &DateRange) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Delivered && range.contains(o.created_at))
            .map(|o| o.total_cents)
            .sum())
    }

    async fn customer_totals(&self) -> StoreResult<Vec<CustomerTotals>> {
        let state = self.state.lock().await;
        let today = Utc::now().date_naive();

        Ok(state
            .accounts
            .iter()
            .rev()
            .filter(|a| a.role == Role::User)
            .map(|account| {
                let orders: Vec<&Order> = state
                    .orders
                    .iter()
                    .filter(|o| o.owner_id == account.id && o.status != OrderStatus::Cancelled)
                    .collect();
                CustomerTotals {
                    account_id: account.id,
                    name: account.name.clone(),
                    email: account.email.clone(),
                    order_count: orders.len() as i64,
                    total_spent_cents: orders.iter().map(|o| o.total_cents).sum(),
                    last_order_at: orders.iter().map(|o| o.created_at).max(),
                    subscribed: state
                        .plans
                        .iter()
                        .any(|p| p.owner_id == account.id && p.is_active_on(today)),
                }
            })
            .collect())
    }
}

#[async_trait]
impl LineItemStore for MemoryStore {
    async fn add_item(&self, order_id: Uuid, item: &NewLineItem) -> StoreResult<LineItem> {
        let mut lines = self
            .state
            .lock()
            .await
            .insert_lines(order_id, std::slice::from_ref(item))?;
        lines
            .pop()
            .ok_or_else(|| StoreError::Integrity("line insert returned no row".into()))
    }

    async fn add_items(&self, order_id: Uuid, items: &[NewLineItem]) -> StoreResult<Vec<LineItem>> {
        self.state.lock().await.insert_lines(order_id, items)
    }

    async fn get_by_order(&self, order_id: Uuid) -> StoreResult<Vec<LineItemDetail>> {
        Ok(self.state.lock().await.line_details(order_id))
    }

    async fn sum_for_order(&self, order_id: Uuid) -> StoreResult<i64> {
        Ok(self.state.lock().await.sum_lines(order_id))
    }

    async fn popularity_stats(&self, filter: &PopularityFilter) -> StoreResult<Vec<ItemPopularity>> {
        let state = self.state.lock().await;

        struct Acc {
            times_ordered: i64,
            total_quantity: i64,
            price_sum: i64,
            revenue: i64,
        }

        let mut by_item: HashMap<Uuid, Acc> = HashMap::new();
        for line in &state.lines {
            let Some(order) = state.order(line.order_id) else {
                continue;
            };
            if filter.status.is_some_and(|s| order.status != s) || !filter.range.contains(order.created_at) {
                continue;
            }
            let acc = by_item.entry(line.item_id).or_insert(Acc {
                times_ordered: 0,
                total_quantity: 0,
                price_sum: 0,
                revenue: 0,
            });
            acc.times_ordered += 1;
            acc.total_quantity += i64::from(line.quantity);
            acc.price_sum += line.unit_price_cents;
            acc.revenue += line.subtotal_cents();
        }

        let mut stats: Vec<ItemPopularity> = by_item
            .into_iter()
            .filter_map(|(item_id, acc)| {
                state.items.get(&item_id).map(|item| ItemPopularity {
                    item_id,
                    name: item.name.clone(),
                    times_ordered: acc.times_ordered,
                    total_quantity: acc.total_quantity,
                    average_price_cents: rounded_mean(acc.price_sum, acc.times_ordered),
                    total_revenue_cents: acc.revenue,
                })
            })
            .collect();
        stats.sort_by(|a, b| {
            b.total_quantity
                .cmp(&a.total_quantity)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        if let Some(limit) = filter.limit {
            stats.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(stats)
    }
}

#[async_trait]
impl DeliveryStore for MemoryStore {
    async fn create(&self, order_id: Uuid, delivery: &NewDelivery) -> StoreResult<Delivery> {
        self.state.lock().await.insert_delivery(order_id, delivery)
    }

    async fn get_by_order(&self, order_id: Uuid) -> StoreResult<Option<Delivery>> {
        Ok(self.state.lock().await.delivery(order_id))
    }

    async fn update_status(
        &self,
        order_id: Uuid,
        status: DeliveryStatus,
        estimated_time: Option<DateTime<Utc>>,
    ) -> StoreResult<Delivery> {
        self.state
            .lock()
            .await
            .set_delivery_status(order_id, status, estimated_time)
    }

    async fn list_all(&self, status: Option<DeliveryStatus>) -> StoreResult<Vec<Delivery>> {
        let state = self.state.lock().await;
        Ok(state
            .deliveries
            .iter()
            .rev()
            .filter(|d| status.map_or(true, |s| d.status == s))
            .cloned()
            .collect())
    }

    async fn statistics(&self) -> StoreResult<DeliveryStatistics> {
        let state = self.state.lock().await;
        let mut stats = DeliveryStatistics::default();
        for delivery in &state.deliveries {
            stats.add(delivery.status, 1);
        }
        Ok(stats)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, account: &NewAccount) -> StoreResult<Account> {
        let mut state = self.state.lock().await;
        if state.accounts.iter().any(|a| a.email == account.email) {
            return Err(StoreError::Conflict(format!(
                "email {} is already registered",
                account.email
            )));
        }

        let row = Account {
            id: Uuid::new_v4(),
            email: account.email.clone(),
            password_hash: account.password_hash.clone(),
            name: account.name.clone(),
            role: account.role,
            created_at: Utc::now(),
        };
        state.accounts.push(row.clone());
        Ok(row)
    }

    async fn get_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn count_by_role(&self, role: Role) -> StoreResult<i64> {
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .iter()
            .filter(|a| a.role == role)
            .count() as i64)
    }

    async fn create_plan(&self, owner_id: Uuid, tier: &str, expires_on: NaiveDate) -> StoreResult<Plan> {
        let mut state = self.state.lock().await;
        if !state.accounts.iter().any(|a| a.id == owner_id) {
            return Err(StoreError::not_found("account", owner_id));
        }

        let plan = Plan {
            id: Uuid::new_v4(),
            owner_id,
            tier: tier.to_string(),
            expires_on,
        };
        state.plans.push(plan.clone());
        Ok(plan)
    }
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn FulfillmentTx>> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = Some(guard.clone());
        Ok(Box::new(MemoryFulfillmentTx { guard, snapshot }))
    }
}

/// Holds the state lock for its whole lifetime. Unless committed, the
/// snapshot taken at `begin` is written back on drop.
pub struct MemoryFulfillmentTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
}

impl Drop for MemoryFulfillmentTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl FulfillmentTx for MemoryFulfillmentTx {
    async fn get_item(&mut self, id: Uuid) -> StoreResult<Option<InventoryItem>> {
        Ok(self.guard.item(id))
    }

    async fn decrement(&mut self, id: Uuid, quantity: i32) -> StoreResult<InventoryItem> {
        self.guard.decrement(id, quantity)
    }

    async fn restock(&mut self, id: Uuid, delta: i32) -> StoreResult<InventoryItem> {
        self.guard.restock(id, delta)
    }

    async fn create_order(
        &mut self,
        owner_id: Uuid,
        total_cents: i64,
        status: OrderStatus,
        payment_method: Option<&str>,
    ) -> StoreResult<Order> {
        self.guard
            .insert_order(owner_id, total_cents, status, payment_method)
    }

    async fn get_order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.guard.order(id))
    }

    async fn update_order_status(&mut self, id: Uuid, status: OrderStatus) -> StoreResult<Order> {
        self.guard.set_order_status(id, status)
    }

    async fn add_line_items(
        &mut self,
        order_id: Uuid,
        items: &[NewLineItem],
    ) -> StoreResult<Vec<LineItem>> {
        self.guard.insert_lines(order_id, items)
    }

    async fn line_items(&mut self, order_id: Uuid) -> StoreResult<Vec<LineItemDetail>> {
        Ok(self.guard.line_details(order_id))
    }

    async fn sum_for_order(&mut self, order_id: Uuid) -> StoreResult<i64> {
        Ok(self.guard.sum_lines(order_id))
    }

    async fn create_delivery(&mut self, order_id: Uuid, delivery: &NewDelivery) -> StoreResult<Delivery> {
        self.guard.insert_delivery(order_id, delivery)
    }

    async fn get_delivery(&mut self, order_id: Uuid) -> StoreResult<Option<Delivery>> {
        Ok(self.guard.delivery(order_id))
    }

    async fn update_delivery_status(
        &mut self,
        order_id: Uuid,
        status: DeliveryStatus,
        estimated_time: Option<DateTime<Utc>>,
    ) -> StoreResult<Delivery> {
        self.guard
            .set_delivery_status(order_id, status, estimated_time)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut tx = self;
        tx.snapshot = None;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mealkit_core::pii::Masked;
    use mealkit_core::ShippingInfo;

    fn kit(name: &str, quantity: i32, price_cents: i64) -> NewInventoryItem {
        NewInventoryItem {
            name: name.to_string(),
            description: None,
            quantity,
            price_cents,
            category: Some("vegan".to_string()),
            dietary_tags: vec![],
        }
    }

    fn recipient() -> ShippingInfo {
        ShippingInfo {
            first_name: "Sam".into(),
            last_name: "Rivera".into(),
            phone: Masked("555-0100".into()),
            address: Masked("1 Main St".into()),
            city: "Springfield".into(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_decrements_never_oversell() {
        let store = MemoryStore::new();
        let item_id = store.create_item(&kit("Lentil Bowl", 5, 1200)).await.unwrap().id;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.decrement(item_id, 1).await }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(matches!(e, StoreError::InsufficientStock { .. })),
            }
        }

        assert_eq!(successes, 5);
        assert_eq!(store.get_item(item_id).await.unwrap().unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn test_decrement_unknown_item_is_not_found() {
        let store = MemoryStore::new();
        let err = store.decrement(Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "inventory item", .. }));
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_restores_state() {
        let store = MemoryStore::new();
        let item = store.create_item(&kit("Tofu Stir Fry", 3, 900)).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            let order = tx
                .create_order(Uuid::new_v4(), 900, OrderStatus::Pending, None)
                .await
                .unwrap();
            tx.decrement(item.id, 1).await.unwrap();
            assert!(tx.get_order(order.id).await.unwrap().is_some());
        }

        assert_eq!(store.get_item(item.id).await.unwrap().unwrap().quantity, 3);
        assert_eq!(OrderStore::statistics(&store).await.unwrap().total_orders, 0);
    }

    #[tokio::test]
    async fn test_committed_unit_of_work_is_visible() {
        let store = MemoryStore::new();
        let item = store.create_item(&kit("Tofu Stir Fry", 3, 900)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.decrement(item.id, 2).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_item(item.id).await.unwrap().unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_order_status_compare_and_set() {
        let store = MemoryStore::new();
        let order = OrderStore::create(&store, Uuid::new_v4(), 1000, OrderStatus::Pending, None)
            .await
            .unwrap();

        let err = OrderStore::update_status(&store, order.id, OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { entity: "order", .. }));

        let confirmed = OrderStore::update_status(&store, order.id, OrderStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_one_delivery_per_order() {
        let store = MemoryStore::new();
        let order = OrderStore::create(&store, Uuid::new_v4(), 0, OrderStatus::Confirmed, None)
            .await
            .unwrap();
        let new = NewDelivery::scheduled(recipient(), order.created_at, chrono::Duration::days(2));

        DeliveryStore::create(&store, order.id, &new).await.unwrap();
        let err = DeliveryStore::create(&store, order.id, &new).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let err = DeliveryStore::create(&store, Uuid::new_v4(), &new).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "order", .. }));
    }

    #[tokio::test]
    async fn test_delivery_pending_to_delivered_rejected() {
        let store = MemoryStore::new();
        let order = OrderStore::create(&store, Uuid::new_v4(), 0, OrderStatus::Confirmed, None)
            .await
            .unwrap();
        let new = NewDelivery::scheduled(recipient(), order.created_at, chrono::Duration::days(2));
        DeliveryStore::create(&store, order.id, &new).await.unwrap();

        let err = DeliveryStore::update_status(&store, order.id, DeliveryStatus::Delivered, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { entity: "delivery", .. }));

        let eta = Utc::now();
        let moving = DeliveryStore::update_status(&store, order.id, DeliveryStatus::InTransit, Some(eta))
            .await
            .unwrap();
        assert_eq!(moving.estimated_time, Some(eta));
    }

    #[tokio::test]
    async fn test_duplicate_line_item_conflicts() {
        let store = MemoryStore::new();
        let item = store.create_item(&kit("Falafel Wrap", 10, 800)).await.unwrap();
        let order = OrderStore::create(&store, Uuid::new_v4(), 800, OrderStatus::Pending, None)
            .await
            .unwrap();
        let line = NewLineItem { item_id: item.id, quantity: 1, unit_price_cents: 800 };

        store.add_item(order.id, &line).await.unwrap();
        let err = store.add_item(order.id, &line).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.sum_for_order(order.id).await.unwrap(), 800);
    }

    #[tokio::test]
    async fn test_low_stock_ordering() {
        let store = MemoryStore::new();
        store.create_item(&kit("A", 8, 100)).await.unwrap();
        store.create_item(&kit("B", 2, 100)).await.unwrap();
        store.create_item(&kit("C", 40, 100)).await.unwrap();

        let low = store.low_stock(10).await.unwrap();
        let quantities: Vec<i32> = low.iter().map(|i| i.quantity).collect();
        assert_eq!(quantities, vec![2, 8]);
    }

    #[tokio::test]
    async fn test_customer_totals_skip_cancelled_orders() {
        let store = MemoryStore::new();
        let account = store
            .create_account(&NewAccount {
                email: "sam@example.com".into(),
                password_hash: "x".into(),
                name: "Sam".into(),
                role: Role::User,
            })
            .await
            .unwrap();
        store
            .create_plan(account.id, "weekly", Utc::now().date_naive() + chrono::Duration::days(30))
            .await
            .unwrap();

        OrderStore::create(&store, account.id, 2000, OrderStatus::Delivered, None)
            .await
            .unwrap();
        OrderStore::create(&store, account.id, 500, OrderStatus::Cancelled, None)
            .await
            .unwrap();

        let totals = store.customer_totals().await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].order_count, 1);
        assert_eq!(totals[0].total_spent_cents, 2000);
        assert!(totals[0].subscribed);
    }

    #[tokio::test]
    async fn test_catalog_filters_and_price_updates() {
        let store = MemoryStore::new();
        let curry = store.create_item(&kit("Curry", 4, 1500)).await.unwrap();
        let salad = store.create_item(&kit("Salad", 0, 700)).await.unwrap();
        let mut soup = kit("Borscht", 9, 600);
        soup.category = Some("soup".into());
        store.create_item(&soup).await.unwrap();

        let vegan = store
            .list_items(&InventoryFilter {
                category: Some("vegan".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<&str> = vegan.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Curry", "Salad"]);

        let cheap = store
            .list_items(&InventoryFilter {
                max_price_cents: Some(800),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(cheap.len(), 2);

        assert!(store.check_available(curry.id, 4).await.unwrap());
        assert!(!store.check_available(salad.id, 1).await.unwrap());
        assert!(!store.check_available(Uuid::new_v4(), 1).await.unwrap());

        let repriced = store.update_price(curry.id, 1650).await.unwrap();
        assert_eq!(repriced.price_cents, 1650);
        assert!(matches!(
            store.update_price(curry.id, -1).await,
            Err(StoreError::Validation(_))
        ));
    }
}

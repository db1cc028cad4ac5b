use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use mealkit_core::pii::Masked;
use mealkit_core::repository::{FulfillmentTx, UnitOfWork};
use mealkit_core::stats::{DateRange, OrderFilter, PopularityFilter};
use mealkit_core::{
    Delivery, DeliveryStatus, ErrorKind, InventoryItem, LineItem, LineItemDetail, NewAccount,
    NewDelivery, NewInventoryItem, NewLineItem, Order, OrderStatus, Role, ShippingInfo,
    StoreError, StoreResult, StoreSet,
};
use mealkit_order::{
    CartLine, CheckoutPhase, CheckoutRequest, FulfillmentError, FulfillmentPolicy,
    FulfillmentService, ReportingService,
};
use mealkit_store::MemoryStore;

fn service(stores: &StoreSet) -> FulfillmentService {
    FulfillmentService::new(stores.clone(), FulfillmentPolicy::default())
}

async fn stock(stores: &StoreSet, name: &str, quantity: i32, price_cents: i64) -> Uuid {
    stores
        .inventory
        .create_item(&NewInventoryItem {
            name: name.to_string(),
            description: Some(format!("{} kit", name)),
            quantity,
            price_cents,
            category: Some("dinner".into()),
            dietary_tags: vec!["vegetarian".into()],
        })
        .await
        .unwrap()
        .id
}

fn shipping() -> ShippingInfo {
    ShippingInfo {
        first_name: "Jordan".into(),
        last_name: "Lee".into(),
        phone: Masked("555-0142".into()),
        address: Masked("40 Orchard Road".into()),
        city: "Portland".into(),
    }
}

fn line(item_id: Uuid, quantity: i32) -> CartLine {
    CartLine { item_id, quantity }
}

async fn quantity_of(stores: &StoreSet, item_id: Uuid) -> i32 {
    stores.inventory.get_item(item_id).await.unwrap().unwrap().quantity
}

#[tokio::test]
async fn test_checkout_decrements_stock_and_freezes_total() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Mushroom Risotto", 5, 1000).await;

    let details = service(&stores)
        .checkout(Uuid::new_v4(), CheckoutRequest::cart(vec![line(item, 3)]))
        .await
        .unwrap();

    assert_eq!(details.order.total_cents, 3000);
    assert_eq!(details.order.status, OrderStatus::Pending);
    assert!(details.delivery.is_none());
    assert_eq!(details.line_total_cents(), details.order.total_cents);
    assert_eq!(quantity_of(&stores, item).await, 2);
}

#[tokio::test]
async fn test_duplicate_cart_lines_are_merged() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Pad Thai", 10, 750).await;

    let details = service(&stores)
        .checkout(Uuid::new_v4(), CheckoutRequest::cart(vec![line(item, 2), line(item, 1)]))
        .await
        .unwrap();

    assert_eq!(details.items.len(), 1);
    assert_eq!(details.items[0].line.quantity, 3);
    assert_eq!(details.order.total_cents, 2250);
    assert_eq!(quantity_of(&stores, item).await, 7);
}

#[tokio::test]
async fn test_concurrent_checkouts_for_remaining_stock() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Green Curry", 5, 1100).await;
    let fulfillment = service(&stores);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let fulfillment = fulfillment.clone();
        handles.push(tokio::spawn(async move {
            fulfillment
                .checkout(Uuid::new_v4(), CheckoutRequest::cart(vec![line(item, 5)]))
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::Conflict);
                assert!(matches!(
                    err,
                    FulfillmentError::Aborted { source: StoreError::InsufficientStock { .. }, .. }
                ));
            }
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(quantity_of(&stores, item).await, 0);
    assert_eq!(stores.orders.statistics().await.unwrap().total_orders, 1);
}

#[tokio::test]
async fn test_two_checkouts_of_three_from_five() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Shakshuka", 5, 900).await;
    let fulfillment = service(&stores);

    let first = fulfillment.clone();
    let second = fulfillment.clone();
    let (a, b) = tokio::join!(
        first.checkout(Uuid::new_v4(), CheckoutRequest::cart(vec![line(item, 3)])),
        second.checkout(Uuid::new_v4(), CheckoutRequest::cart(vec![line(item, 3)])),
    );

    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let failure = a.err().or(b.err()).unwrap();
    assert_eq!(failure.kind(), ErrorKind::Conflict);
    assert_eq!(quantity_of(&stores, item).await, 2);
}

#[tokio::test]
async fn test_checkout_with_shipping_confirms_and_schedules_delivery() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Lemon Salmon", 4, 1500).await;

    let details = service(&stores)
        .checkout(
            Uuid::new_v4(),
            CheckoutRequest::cart(vec![line(item, 1)]).with_shipping(shipping()),
        )
        .await
        .unwrap();

    assert_eq!(details.order.status, OrderStatus::Confirmed);
    let delivery = details.delivery.unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Pending);
    assert_eq!(
        delivery.estimated_time,
        Some(details.order.created_at + chrono::Duration::days(2))
    );
}

#[tokio::test]
async fn test_second_delivery_conflicts_and_keeps_original() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Bean Chili", 4, 800).await;
    let owner = Uuid::new_v4();
    let fulfillment = service(&stores);

    let details = fulfillment
        .checkout(owner, CheckoutRequest::cart(vec![line(item, 1)]).with_shipping(shipping()))
        .await
        .unwrap();
    let original = details.delivery.unwrap();

    let mut other = shipping();
    other.city = "Seattle".into();
    let err = fulfillment
        .create_delivery(Some(owner), details.order.id, other, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let stored = fulfillment
        .order_delivery(Some(owner), details.order.id)
        .await
        .unwrap();
    assert_eq!(stored, original);
}

#[tokio::test]
async fn test_delivery_cannot_skip_transit() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Tomato Soup", 4, 600).await;
    let fulfillment = service(&stores);

    let details = fulfillment
        .checkout(Uuid::new_v4(), CheckoutRequest::cart(vec![line(item, 1)]).with_shipping(shipping()))
        .await
        .unwrap();
    let order_id = details.order.id;

    let err = fulfillment
        .advance_delivery(order_id, DeliveryStatus::Delivered, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    fulfillment
        .advance_delivery(order_id, DeliveryStatus::InTransit, None)
        .await
        .unwrap();
    let delivered = fulfillment
        .advance_delivery(order_id, DeliveryStatus::Delivered, None)
        .await
        .unwrap();
    assert_eq!(delivered.status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn test_short_line_aborts_whole_checkout() {
    let stores = MemoryStore::new().stores();
    let plenty = stock(&stores, "Veggie Lasagna", 10, 1200).await;
    let scarce = stock(&stores, "Truffle Pasta", 1, 2500).await;

    let err = service(&stores)
        .checkout(
            Uuid::new_v4(),
            CheckoutRequest::cart(vec![line(plenty, 2), line(scarce, 2)]).with_shipping(shipping()),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.phase(), Some(CheckoutPhase::Validating));
    assert_eq!(quantity_of(&stores, plenty).await, 10);
    assert_eq!(quantity_of(&stores, scarce).await, 1);
    assert_eq!(stores.orders.statistics().await.unwrap().total_orders, 0);
    assert_eq!(stores.deliveries.statistics().await.unwrap().total_deliveries, 0);
}

#[tokio::test]
async fn test_unknown_item_aborts_checkout() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Miso Ramen", 3, 1300).await;

    let err = service(&stores)
        .checkout(Uuid::new_v4(), CheckoutRequest::cart(vec![line(item, 1), line(Uuid::new_v4(), 1)]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(quantity_of(&stores, item).await, 3);
}

#[tokio::test]
async fn test_expected_total_must_match() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Poke Bowl", 3, 1400).await;

    let mut request = CheckoutRequest::cart(vec![line(item, 2)]);
    request.expected_total_cents = Some(2000);
    let err = service(&stores)
        .checkout(Uuid::new_v4(), request)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FulfillmentError::TotalMismatch { expected: 2000, computed: 2800 }
    ));
    assert_eq!(quantity_of(&stores, item).await, 3);
}

#[tokio::test]
async fn test_checkout_times_out_while_store_is_busy() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Gnocchi", 3, 1000).await;
    let fulfillment = FulfillmentService::new(
        stores.clone(),
        FulfillmentPolicy {
            checkout_timeout: Duration::from_millis(50),
            ..FulfillmentPolicy::default()
        },
    );

    let blocker = stores.unit_of_work.begin().await.unwrap();
    let err = fulfillment
        .checkout(Uuid::new_v4(), CheckoutRequest::cart(vec![line(item, 1)]))
        .await
        .unwrap_err();
    drop(blocker);

    assert!(matches!(err, FulfillmentError::TimedOut(_)));
    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert_eq!(quantity_of(&stores, item).await, 3);
}

#[tokio::test]
async fn test_cancel_restocks_and_fails_delivery() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Beef Stew", 6, 1600).await;
    let owner = Uuid::new_v4();
    let fulfillment = service(&stores);

    let details = fulfillment
        .checkout(owner, CheckoutRequest::cart(vec![line(item, 4)]).with_shipping(shipping()))
        .await
        .unwrap();
    assert_eq!(quantity_of(&stores, item).await, 2);

    let err = fulfillment
        .cancel_order(Some(Uuid::new_v4()), details.order.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let cancelled = fulfillment
        .cancel_order(Some(owner), details.order.id)
        .await
        .unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.delivery.unwrap().status, DeliveryStatus::Failed);
    assert_eq!(quantity_of(&stores, item).await, 6);

    let err = fulfillment
        .cancel_order(Some(owner), details.order.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(quantity_of(&stores, item).await, 6);
}

#[tokio::test]
async fn test_pending_order_gets_delivery_later() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Falafel Plate", 6, 900).await;
    let owner = Uuid::new_v4();
    let fulfillment = service(&stores);

    let details = fulfillment
        .checkout(owner, CheckoutRequest::cart(vec![line(item, 1)]))
        .await
        .unwrap();

    let err = fulfillment
        .create_delivery(Some(Uuid::new_v4()), details.order.id, shipping(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let eta = Utc::now() + chrono::Duration::days(5);
    let delivery = fulfillment
        .create_delivery(Some(owner), details.order.id, shipping(), Some(eta))
        .await
        .unwrap();
    assert_eq!(delivery.estimated_time, Some(eta));

    let confirmed = fulfillment
        .advance_order(details.order.id, OrderStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn test_reads_are_scoped_and_repeatable() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Quinoa Salad", 6, 850).await;
    let owner = Uuid::new_v4();
    let fulfillment = service(&stores);

    let details = fulfillment
        .checkout(owner, CheckoutRequest::cart(vec![line(item, 2)]))
        .await
        .unwrap();

    let first = fulfillment.order_lines(Some(owner), details.order.id).await.unwrap();
    let second = fulfillment.order_lines(Some(owner), details.order.id).await.unwrap();
    assert_eq!(first, second);

    let err = fulfillment
        .order_details(Some(Uuid::new_v4()), details.order.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mine = fulfillment.orders_for(owner, Some(OrderStatus::Pending)).await.unwrap();
    assert_eq!(mine.len(), 1);
}

#[tokio::test]
async fn test_reporting_aggregates() {
    let stores = MemoryStore::new().stores();
    let soup = stock(&stores, "Lentil Soup", 18, 500).await;
    let wrap = stock(&stores, "Chicken Wrap", 16, 900).await;
    let fulfillment = service(&stores);
    let reporting = ReportingService::new(stores.clone(), 15);

    let customer = stores
        .accounts
        .create_account(&NewAccount {
            email: "casey@example.com".into(),
            password_hash: "hash".into(),
            name: "Casey".into(),
            role: Role::User,
        })
        .await
        .unwrap();

    let delivered = fulfillment
        .checkout(customer.id, CheckoutRequest::cart(vec![line(soup, 4), line(wrap, 1)]))
        .await
        .unwrap();
    fulfillment
        .advance_order(delivered.order.id, OrderStatus::Confirmed)
        .await
        .unwrap();
    fulfillment
        .advance_order(delivered.order.id, OrderStatus::Delivered)
        .await
        .unwrap();
    fulfillment
        .checkout(customer.id, CheckoutRequest::cart(vec![line(wrap, 2)]))
        .await
        .unwrap();

    let dashboard = reporting.dashboard(&DateRange::default()).await.unwrap();
    assert_eq!(dashboard.total_users, 1);
    assert_eq!(dashboard.total_orders, 2);
    assert_eq!(dashboard.total_revenue_cents, 2900);
    assert_eq!(dashboard.average_order_value_cents, 2350);

    let popular = reporting
        .popular_items(&PopularityFilter::default())
        .await
        .unwrap();
    assert_eq!(popular[0].item_id, soup);
    assert_eq!(popular[0].total_quantity, 4);
    assert_eq!(popular[1].times_ordered, 2);
    assert_eq!(popular[1].total_revenue_cents, 2700);

    let totals = reporting.customer_totals().await.unwrap();
    assert_eq!(totals[0].order_count, 2);
    assert_eq!(totals[0].total_spent_cents, 4700);

    let low = reporting.low_stock(None).await.unwrap();
    assert_eq!(low.len(), 2);
    assert_eq!(low[0].id, wrap);

    let pending = reporting
        .orders(&OrderFilter {
            status: Some(OrderStatus::Pending),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    let restocked = reporting.restock(wrap, 5).await.unwrap();
    assert_eq!(restocked.quantity, 18);
}

// ============================================================================
// Fault injection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault {
    None,
    /// Fails the decrement after this many have succeeded.
    Decrement { after: usize },
    CreateDelivery,
}

/// Wraps a backend's unit of work, failing one chosen write and recording
/// the item ids passed to `restock`.
struct FaultyUnitOfWork {
    inner: Arc<dyn UnitOfWork>,
    fault: Fault,
    restocked: Arc<Mutex<Vec<Uuid>>>,
}

struct FaultyTx {
    inner: Box<dyn FulfillmentTx>,
    fault: Fault,
    decrements: usize,
    restocked: Arc<Mutex<Vec<Uuid>>>,
}

fn injected(what: &str) -> StoreError {
    StoreError::Infrastructure(format!("connection reset during {}", what).into())
}

#[async_trait]
impl UnitOfWork for FaultyUnitOfWork {
    async fn begin(&self) -> StoreResult<Box<dyn FulfillmentTx>> {
        Ok(Box::new(FaultyTx {
            inner: self.inner.begin().await?,
            fault: self.fault,
            decrements: 0,
            restocked: self.restocked.clone(),
        }))
    }
}

#[async_trait]
impl FulfillmentTx for FaultyTx {
    async fn get_item(&mut self, id: Uuid) -> StoreResult<Option<InventoryItem>> {
        self.inner.get_item(id).await
    }

    async fn decrement(&mut self, id: Uuid, quantity: i32) -> StoreResult<InventoryItem> {
        if self.fault == (Fault::Decrement { after: self.decrements }) {
            return Err(injected("decrement"));
        }
        self.decrements += 1;
        self.inner.decrement(id, quantity).await
    }

    async fn restock(&mut self, id: Uuid, delta: i32) -> StoreResult<InventoryItem> {
        self.restocked.lock().unwrap().push(id);
        self.inner.restock(id, delta).await
    }

    async fn create_order(
        &mut self,
        owner_id: Uuid,
        total_cents: i64,
        status: OrderStatus,
        payment_method: Option<&str>,
    ) -> StoreResult<Order> {
        self.inner
            .create_order(owner_id, total_cents, status, payment_method)
            .await
    }

    async fn get_order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        self.inner.get_order(id).await
    }

    async fn update_order_status(&mut self, id: Uuid, status: OrderStatus) -> StoreResult<Order> {
        self.inner.update_order_status(id, status).await
    }

    async fn add_line_items(&mut self, order_id: Uuid, items: &[NewLineItem]) -> StoreResult<Vec<LineItem>> {
        self.inner.add_line_items(order_id, items).await
    }

    async fn line_items(&mut self, order_id: Uuid) -> StoreResult<Vec<LineItemDetail>> {
        self.inner.line_items(order_id).await
    }

    async fn sum_for_order(&mut self, order_id: Uuid) -> StoreResult<i64> {
        self.inner.sum_for_order(order_id).await
    }

    async fn create_delivery(&mut self, order_id: Uuid, delivery: &NewDelivery) -> StoreResult<Delivery> {
        if self.fault == Fault::CreateDelivery {
            return Err(injected("create_delivery"));
        }
        self.inner.create_delivery(order_id, delivery).await
    }

    async fn get_delivery(&mut self, order_id: Uuid) -> StoreResult<Option<Delivery>> {
        self.inner.get_delivery(order_id).await
    }

    async fn update_delivery_status(
        &mut self,
        order_id: Uuid,
        status: DeliveryStatus,
        estimated_time: Option<DateTime<Utc>>,
    ) -> StoreResult<Delivery> {
        self.inner
            .update_delivery_status(order_id, status, estimated_time)
            .await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

fn faulty_stores(fault: Fault) -> (StoreSet, Arc<Mutex<Vec<Uuid>>>) {
    let mut stores = MemoryStore::new().stores();
    let restocked = Arc::new(Mutex::new(Vec::new()));
    stores.unit_of_work = Arc::new(FaultyUnitOfWork {
        inner: stores.unit_of_work.clone(),
        fault,
        restocked: restocked.clone(),
    });
    (stores, restocked)
}

#[tokio::test]
async fn test_failed_decrement_after_writes_rolls_back_everything() {
    let (stores, _) = faulty_stores(Fault::Decrement { after: 1 });
    let tofu = stock(&stores, "Tofu Bowl", 5, 800).await;
    let noodles = stock(&stores, "Soba Noodles", 5, 700).await;

    let err = service(&stores)
        .checkout(
            Uuid::new_v4(),
            CheckoutRequest::cart(vec![line(tofu, 2), line(noodles, 3)]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(CheckoutPhase::Committing));
    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert_eq!(stores.orders.statistics().await.unwrap().total_orders, 0);
    assert!(stores
        .line_items
        .popularity_stats(&PopularityFilter::default())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(quantity_of(&stores, tofu).await, 5);
    assert_eq!(quantity_of(&stores, noodles).await, 5);
}

#[tokio::test]
async fn test_failed_delivery_insert_rolls_back_order_and_stock() {
    let (stores, _) = faulty_stores(Fault::CreateDelivery);
    let item = stock(&stores, "Veggie Lasagna", 4, 1300).await;

    let err = service(&stores)
        .checkout(
            Uuid::new_v4(),
            CheckoutRequest::cart(vec![line(item, 4)]).with_shipping(shipping()),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FulfillmentError::Aborted {
            phase: CheckoutPhase::Committing,
            ..
        }
    ));
    assert_eq!(stores.orders.statistics().await.unwrap().total_orders, 0);
    assert!(stores.deliveries.list_all(None).await.unwrap().is_empty());
    assert_eq!(quantity_of(&stores, item).await, 4);
}

#[tokio::test]
async fn test_cancel_restocks_in_item_id_order() {
    let (stores, restocked) = faulty_stores(Fault::None);
    let zucchini = stock(&stores, "Zucchini Fritters", 5, 600).await;
    let apple = stock(&stores, "Apple Crumble", 5, 400).await;
    let fulfillment = service(&stores);
    let owner = Uuid::new_v4();

    let order = fulfillment
        .checkout(owner, CheckoutRequest::cart(vec![line(zucchini, 1), line(apple, 2)]))
        .await
        .unwrap();
    let cancelled = fulfillment.cancel_order(Some(owner), order.order.id).await.unwrap();

    let mut ascending = vec![zucchini, apple];
    ascending.sort();
    assert_eq!(*restocked.lock().unwrap(), ascending);

    let names: Vec<&str> = cancelled.items.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Apple Crumble", "Zucchini Fritters"]);
    assert_eq!(quantity_of(&stores, zucchini).await, 5);
    assert_eq!(quantity_of(&stores, apple).await, 5);
}

#[tokio::test]
async fn test_popularity_ties_break_on_item_id() {
    let stores = MemoryStore::new().stores();
    let first = stock(&stores, "Quinoa Salad", 10, 900).await;
    let second = stock(&stores, "Barley Stew", 10, 700).await;
    let third = stock(&stores, "Corn Chowder", 10, 500).await;
    let fulfillment = service(&stores);

    fulfillment
        .checkout(
            Uuid::new_v4(),
            CheckoutRequest::cart(vec![line(first, 3), line(second, 3), line(third, 1)]),
        )
        .await
        .unwrap();

    let reporting = ReportingService::new(stores.clone(), 10);
    let popular = reporting
        .popular_items(&PopularityFilter::default())
        .await
        .unwrap();

    let (low, high) = if first < second { (first, second) } else { (second, first) };
    let ids: Vec<Uuid> = popular.iter().map(|p| p.item_id).collect();
    assert_eq!(ids, vec![low, high, third]);

    let top = reporting
        .popular_items(&PopularityFilter {
            limit: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].item_id, low);
    assert_eq!(top[0].total_quantity, 3);
}

#[tokio::test]
async fn test_order_delivered_ahead_of_delivery_keeps_delivery_status() {
    let stores = MemoryStore::new().stores();
    let item = stock(&stores, "Shakshuka Kit", 3, 1100).await;
    let fulfillment = service(&stores);

    let placed = fulfillment
        .checkout(Uuid::new_v4(), CheckoutRequest::cart(vec![line(item, 1)]).with_shipping(shipping()))
        .await
        .unwrap();

    let order = fulfillment
        .advance_order(placed.order.id, OrderStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);

    let delivery = fulfillment.order_delivery(None, placed.order.id).await.unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Pending);
}

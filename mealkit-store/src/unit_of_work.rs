use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use mealkit_core::repository::{FulfillmentTx, UnitOfWork};
use mealkit_core::{
    Delivery, DeliveryStatus, InventoryItem, LineItem, LineItemDetail, NewDelivery, NewLineItem,
    Order, OrderStatus, StoreResult,
};

use crate::delivery_repo::{fetch_delivery, insert_delivery, set_delivery_status};
use crate::error::db_err;
use crate::inventory_repo::{decrement_item, lock_item, restock_item};
use crate::line_item_repo::{fetch_lines, insert_lines, sum_lines};
use crate::order_repo::{fetch_order, insert_order, set_order_status};

pub struct PgUnitOfWork {
    pool: PgPool,
}

impl PgUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn begin(&self) -> StoreResult<Box<dyn FulfillmentTx>> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgFulfillmentTx { tx }))
    }
}

/// One Postgres transaction. sqlx rolls it back when dropped uncommitted.
pub struct PgFulfillmentTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl FulfillmentTx for PgFulfillmentTx {
    async fn get_item(&mut self, id: Uuid) -> StoreResult<Option<InventoryItem>> {
        // Row lock: the price snapshot and the later decrement see the same row
        lock_item(&mut *self.tx, id).await
    }

    async fn decrement(&mut self, id: Uuid, quantity: i32) -> StoreResult<InventoryItem> {
        decrement_item(&mut *self.tx, id, quantity).await
    }

    async fn restock(&mut self, id: Uuid, delta: i32) -> StoreResult<InventoryItem> {
        restock_item(&mut *self.tx, id, delta).await
    }

    async fn create_order(
        &mut self,
        owner_id: Uuid,
        total_cents: i64,
        status: OrderStatus,
        payment_method: Option<&str>,
    ) -> StoreResult<Order> {
        insert_order(&mut *self.tx, owner_id, total_cents, status, payment_method).await
    }

    async fn get_order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        fetch_order(&mut *self.tx, id).await
    }

    async fn update_order_status(&mut self, id: Uuid, status: OrderStatus) -> StoreResult<Order> {
        set_order_status(&mut *self.tx, id, status).await
    }

    async fn add_line_items(
        &mut self,
        order_id: Uuid,
        items: &[NewLineItem],
    ) -> StoreResult<Vec<LineItem>> {
        insert_lines(&mut *self.tx, order_id, items).await
    }

    async fn line_items(&mut self, order_id: Uuid) -> StoreResult<Vec<LineItemDetail>> {
        fetch_lines(&mut *self.tx, order_id).await
    }

    async fn sum_for_order(&mut self, order_id: Uuid) -> StoreResult<i64> {
        sum_lines(&mut *self.tx, order_id).await
    }

    async fn create_delivery(&mut self, order_id: Uuid, delivery: &NewDelivery) -> StoreResult<Delivery> {
        insert_delivery(&mut *self.tx, order_id, delivery).await
    }

    async fn get_delivery(&mut self, order_id: Uuid) -> StoreResult<Option<Delivery>> {
        fetch_delivery(&mut *self.tx, order_id).await
    }

    async fn update_delivery_status(
        &mut self,
        order_id: Uuid,
        status: DeliveryStatus,
        estimated_time: Option<DateTime<Utc>>,
    ) -> StoreResult<Delivery> {
        set_delivery_status(&mut *self.tx, order_id, status, estimated_time).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(db_err)?;
        debug!("fulfillment transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await.map_err(db_err)?;
        debug!("fulfillment transaction rolled back");
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mealkit_core::repository::FulfillmentTx;
use mealkit_core::{
    Delivery, DeliveryStatus, LineItemDetail, NewDelivery, NewLineItem, Order, OrderDetails,
    OrderStatus, ShippingInfo, StoreError, StoreSet,
};

use crate::checkout::{CartLine, CheckoutPhase, CheckoutRequest};
use crate::error::{FulfillmentError, FulfillmentResult};

#[derive(Debug, Clone, Copy)]
pub struct FulfillmentPolicy {
    /// Added to the order's creation time to get a new delivery's estimate.
    pub delivery_lead: chrono::Duration,
    pub checkout_timeout: Duration,
}

impl Default for FulfillmentPolicy {
    fn default() -> Self {
        Self {
            delivery_lead: chrono::Duration::days(2),
            checkout_timeout: Duration::from_secs(5),
        }
    }
}

/// Drives checkout, cancellation and the delivery lifecycle over a set of stores.
/// Every multi-step write goes through one unit of work.
#[derive(Clone)]
pub struct FulfillmentService {
    stores: StoreSet,
    policy: FulfillmentPolicy,
}

fn aborted(phase: CheckoutPhase) -> impl Fn(StoreError) -> FulfillmentError {
    move |source| FulfillmentError::Aborted { phase, source }
}

/// Commits on success, rolls back otherwise.
async fn finish<T>(tx: Box<dyn FulfillmentTx>, result: FulfillmentResult<T>) -> FulfillmentResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

impl FulfillmentService {
    pub fn new(stores: StoreSet, policy: FulfillmentPolicy) -> Self {
        Self { stores, policy }
    }

    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    pub fn policy(&self) -> FulfillmentPolicy {
        self.policy
    }

    /// Turns a cart into an order, its line items, the stock decrements and an
    /// optional delivery. Either all of it is committed or none of it is.
    #[tracing::instrument(skip(self, request), fields(owner = %owner_id, lines = request.items.len()))]
    pub async fn checkout(&self, owner_id: Uuid, request: CheckoutRequest) -> FulfillmentResult<OrderDetails> {
        let lines = request.normalize()?;

        match tokio::time::timeout(
            self.policy.checkout_timeout,
            self.run_checkout(owner_id, &request, &lines),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(phase = %CheckoutPhase::Aborted, timeout = ?self.policy.checkout_timeout, "checkout timed out");
                Err(FulfillmentError::TimedOut(self.policy.checkout_timeout))
            }
        }
    }

    async fn run_checkout(
        &self,
        owner_id: Uuid,
        request: &CheckoutRequest,
        lines: &[CartLine],
    ) -> FulfillmentResult<OrderDetails> {
        let mut tx = self
            .stores
            .unit_of_work
            .begin()
            .await
            .map_err(aborted(CheckoutPhase::Validating))?;

        match self.apply_checkout(tx.as_mut(), owner_id, request, lines).await {
            Ok(details) => {
                tx.commit().await.map_err(aborted(CheckoutPhase::Committing))?;
                info!(
                    phase = %CheckoutPhase::Done,
                    order_id = %details.order.id,
                    status = %details.order.status,
                    total_cents = details.order.total_cents,
                    "checkout committed"
                );
                Ok(details)
            }
            Err(err) => {
                warn!(phase = %CheckoutPhase::Aborted, failed_during = ?err.phase(), error = %err, "checkout aborted");
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "checkout rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn apply_checkout(
        &self,
        tx: &mut dyn FulfillmentTx,
        owner_id: Uuid,
        request: &CheckoutRequest,
        lines: &[CartLine],
    ) -> FulfillmentResult<OrderDetails> {
        debug!(phase = %CheckoutPhase::Validating, "checkout phase");
        let validating = aborted(CheckoutPhase::Validating);

        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            let item = tx
                .get_item(line.item_id)
                .await
                .map_err(&validating)?
                .ok_or_else(|| validating(StoreError::not_found("inventory item", line.item_id)))?;

            if !item.can_supply(line.quantity) {
                return Err(validating(StoreError::InsufficientStock {
                    item_id: item.id,
                    requested: line.quantity,
                    available: if item.is_active { item.quantity } else { 0 },
                }));
            }
            priced.push(NewLineItem {
                item_id: item.id,
                quantity: line.quantity,
                unit_price_cents: item.price_cents,
            });
        }

        let total_cents = priced
            .iter()
            .try_fold(0i64, |acc, line| {
                i64::from(line.quantity)
                    .checked_mul(line.unit_price_cents)
                    .and_then(|subtotal| acc.checked_add(subtotal))
            })
            .ok_or_else(|| FulfillmentError::Validation("order total is too large".into()))?;

        if let Some(expected) = request.expected_total_cents {
            if expected != total_cents {
                return Err(FulfillmentError::TotalMismatch {
                    expected,
                    computed: total_cents,
                });
            }
        }

        debug!(phase = %CheckoutPhase::Committing, total_cents, "checkout phase");
        let committing = aborted(CheckoutPhase::Committing);

        let status = if request.shipping.is_some() {
            OrderStatus::Confirmed
        } else {
            OrderStatus::Pending
        };
        let order = tx
            .create_order(owner_id, total_cents, status, request.payment_label())
            .await
            .map_err(&committing)?;

        tx.add_line_items(order.id, &priced).await.map_err(&committing)?;
        for line in &priced {
            tx.decrement(line.item_id, line.quantity)
                .await
                .map_err(&committing)?;
        }

        let persisted = tx.sum_for_order(order.id).await.map_err(&committing)?;
        if persisted != order.total_cents {
            return Err(committing(StoreError::Integrity(format!(
                "order {} total {} does not match line items {}",
                order.id, order.total_cents, persisted
            ))));
        }

        let delivery = match &request.shipping {
            Some(recipient) => {
                let new = NewDelivery::scheduled(recipient.clone(), order.created_at, self.policy.delivery_lead);
                Some(tx.create_delivery(order.id, &new).await.map_err(&committing)?)
            }
            None => None,
        };

        let items = tx.line_items(order.id).await.map_err(&committing)?;
        Ok(OrderDetails {
            order,
            items,
            delivery,
        })
    }

    /// Cancels an order and puts its line quantities back on the shelf. A
    /// delivery still under way is marked failed.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, owner_id: Option<Uuid>, order_id: Uuid) -> FulfillmentResult<OrderDetails> {
        let mut tx = self.stores.unit_of_work.begin().await?;
        let result = Self::apply_cancel(tx.as_mut(), owner_id, order_id).await;
        let details = finish(tx, result).await?;

        info!(order_id = %order_id, restocked_lines = details.items.len(), "order cancelled");
        Ok(details)
    }

    async fn apply_cancel(
        tx: &mut dyn FulfillmentTx,
        owner_id: Option<Uuid>,
        order_id: Uuid,
    ) -> FulfillmentResult<OrderDetails> {
        owned_order(tx, owner_id, order_id).await?;

        let order = tx.update_order_status(order_id, OrderStatus::Cancelled).await?;
        let items = tx.line_items(order_id).await?;

        // Same row-lock order as checkout: ascending item id.
        let mut restocks: Vec<(Uuid, i32)> = items
            .iter()
            .map(|detail| (detail.line.item_id, detail.line.quantity))
            .collect();
        restocks.sort_unstable_by_key(|(item_id, _)| *item_id);
        for (item_id, quantity) in restocks {
            tx.restock(item_id, quantity).await?;
        }

        let delivery = match tx.get_delivery(order_id).await? {
            Some(delivery) if !delivery.status.is_terminal() => Some(
                tx.update_delivery_status(order_id, DeliveryStatus::Failed, None)
                    .await?,
            ),
            other => other,
        };

        Ok(OrderDetails {
            order,
            items,
            delivery,
        })
    }

    /// Schedules a delivery for an order placed without shipping details.
    /// Without an explicit estimate the configured lead time is counted from now.
    #[tracing::instrument(skip(self, recipient))]
    pub async fn create_delivery(
        &self,
        owner_id: Option<Uuid>,
        order_id: Uuid,
        recipient: ShippingInfo,
        estimated_time: Option<DateTime<Utc>>,
    ) -> FulfillmentResult<Delivery> {
        recipient.validate()?;

        let mut tx = self.stores.unit_of_work.begin().await?;
        let result = self
            .apply_create_delivery(tx.as_mut(), owner_id, order_id, recipient, estimated_time)
            .await;
        let delivery = finish(tx, result).await?;

        info!(order_id = %order_id, delivery_id = %delivery.id, "delivery scheduled");
        Ok(delivery)
    }

    async fn apply_create_delivery(
        &self,
        tx: &mut dyn FulfillmentTx,
        owner_id: Option<Uuid>,
        order_id: Uuid,
        recipient: ShippingInfo,
        estimated_time: Option<DateTime<Utc>>,
    ) -> FulfillmentResult<Delivery> {
        let order = owned_order(tx, owner_id, order_id).await?;
        if order.status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "order {} is {} and cannot be delivered",
                order.id, order.status
            ))
            .into());
        }

        let mut new = NewDelivery::scheduled(recipient, Utc::now(), self.policy.delivery_lead);
        if estimated_time.is_some() {
            new.estimated_time = estimated_time;
        }
        Ok(tx.create_delivery(order_id, &new).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn advance_delivery(
        &self,
        order_id: Uuid,
        status: DeliveryStatus,
        estimated_time: Option<DateTime<Utc>>,
    ) -> FulfillmentResult<Delivery> {
        let delivery = self
            .stores
            .deliveries
            .update_status(order_id, status, estimated_time)
            .await?;

        info!(order_id = %order_id, status = %delivery.status, "delivery status updated");
        Ok(delivery)
    }

    /// Moves an order along its state machine. Cancellation goes through
    /// `cancel_order` so stock is returned.
    #[tracing::instrument(skip(self))]
    pub async fn advance_order(&self, order_id: Uuid, status: OrderStatus) -> FulfillmentResult<Order> {
        if status == OrderStatus::Cancelled {
            return Ok(self.cancel_order(None, order_id).await?.order);
        }

        let order = self.stores.orders.update_status(order_id, status).await?;
        info!(order_id = %order_id, status = %order.status, "order status updated");

        if order.status == OrderStatus::Delivered {
            match self.stores.deliveries.get_by_order(order_id).await? {
                Some(delivery) if delivery.status != DeliveryStatus::Delivered => {
                    warn!(order_id = %order_id, delivery_status = %delivery.status, "order delivered before its delivery")
                }
                None => warn!(order_id = %order_id, "order delivered without a delivery record"),
                Some(_) => {}
            }
        }
        Ok(order)
    }

    /// Header, line items and delivery for one order. With an owner the read
    /// is scoped to that account and other accounts' orders are not found.
    pub async fn order_details(&self, owner_id: Option<Uuid>, order_id: Uuid) -> FulfillmentResult<OrderDetails> {
        let order = self.find_order(owner_id, order_id).await?;
        let items = self.stores.line_items.get_by_order(order_id).await?;
        let delivery = self.stores.deliveries.get_by_order(order_id).await?;

        Ok(OrderDetails {
            order,
            items,
            delivery,
        })
    }

    pub async fn order_lines(
        &self,
        owner_id: Option<Uuid>,
        order_id: Uuid,
    ) -> FulfillmentResult<Vec<LineItemDetail>> {
        self.find_order(owner_id, order_id).await?;
        Ok(self.stores.line_items.get_by_order(order_id).await?)
    }

    pub async fn order_delivery(&self, owner_id: Option<Uuid>, order_id: Uuid) -> FulfillmentResult<Delivery> {
        self.find_order(owner_id, order_id).await?;
        self.stores
            .deliveries
            .get_by_order(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("delivery", order_id))
    }

    pub async fn orders_for(&self, owner_id: Uuid, status: Option<OrderStatus>) -> FulfillmentResult<Vec<Order>> {
        Ok(self.stores.orders.list_by_owner(owner_id, status).await?)
    }

    async fn find_order(&self, owner_id: Option<Uuid>, order_id: Uuid) -> FulfillmentResult<Order> {
        let order = match owner_id {
            Some(owner_id) => self.stores.orders.get_by_id_for_owner(order_id, owner_id).await?,
            None => self.stores.orders.get_by_id(order_id).await?,
        };
        order.ok_or_else(|| FulfillmentError::not_found("order", order_id))
    }
}

async fn owned_order(tx: &mut dyn FulfillmentTx, owner_id: Option<Uuid>, order_id: Uuid) -> FulfillmentResult<Order> {
    tx.get_order(order_id)
        .await?
        .filter(|order| owner_id.map_or(true, |owner| order.owner_id == owner))
        .ok_or_else(|| FulfillmentError::not_found("order", order_id))
}

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::pii::Masked;
use crate::{StoreError, StoreResult};

#[derive(Debug, thiserror::Error)]
#[error("Unknown {kind} value: {value}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    Dietitian,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Dietitian => "dietitian",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "dietitian" => Ok(Role::Dietitian),
            other => Err(ParseStatusError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
}

/// Subscription row. Only persisted here; billing lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub tier: String,
    pub expires_on: NaiveDate,
}

impl Plan {
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.expires_on > day
    }
}

// ============================================================================
// Inventory
// ============================================================================

/// A meal kit on the shelf. `quantity` never drops below zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub price_cents: i64,
    pub category: Option<String>,
    pub dietary_tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn can_supply(&self, requested: i32) -> bool {
        self.is_active && self.quantity >= requested
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInventoryItem {
    pub name: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub price_cents: i64,
    pub category: Option<String>,
    #[serde(default)]
    pub dietary_tags: Vec<String>,
}

impl NewInventoryItem {
    pub fn validate(&self) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Validation("item name must not be empty".into()));
        }
        if self.quantity < 0 {
            return Err(StoreError::Validation("quantity must not be negative".into()));
        }
        if self.price_cents < 0 {
            return Err(StoreError::Validation("price must not be negative".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Orders
// ============================================================================

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// States from which `self` may be entered.
    pub fn predecessors(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[],
            OrderStatus::Confirmed => &[OrderStatus::Pending],
            OrderStatus::Delivered => &[OrderStatus::Confirmed],
            OrderStatus::Cancelled => &[OrderStatus::Pending, OrderStatus::Confirmed],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        next.predecessors().contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn transition(&self, next: OrderStatus) -> StoreResult<OrderStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StoreError::InvalidTransition {
                entity: "order",
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

/// Order header. `total_cents` is frozen at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One item's quantity and locked-in price within an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    pub order_id: Uuid,
    pub item_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

impl LineItem {
    pub fn subtotal_cents(&self) -> i64 {
        i64::from(self.quantity) * self.unit_price_cents
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewLineItem {
    pub item_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

impl NewLineItem {
    pub fn validate(&self) -> StoreResult<()> {
        if self.quantity <= 0 {
            return Err(StoreError::Validation(format!(
                "quantity for item {} must be positive",
                self.item_id
            )));
        }
        if self.unit_price_cents < 0 {
            return Err(StoreError::Validation(format!(
                "unit price for item {} must not be negative",
                self.item_id
            )));
        }
        Ok(())
    }
}

/// Line item joined with the item's current catalog name and price, for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItemDetail {
    #[serde(flatten)]
    pub line: LineItem,
    pub name: String,
    pub current_price_cents: i64,
}

// ============================================================================
// Deliveries
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InTransit,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 4] = [
        DeliveryStatus::Pending,
        DeliveryStatus::InTransit,
        DeliveryStatus::Delivered,
        DeliveryStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn predecessors(&self) -> &'static [DeliveryStatus] {
        match self {
            DeliveryStatus::Pending => &[],
            DeliveryStatus::InTransit => &[DeliveryStatus::Pending],
            DeliveryStatus::Delivered => &[DeliveryStatus::InTransit],
            DeliveryStatus::Failed => &[DeliveryStatus::Pending, DeliveryStatus::InTransit],
        }
    }

    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        next.predecessors().contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }

    pub fn transition(&self, next: DeliveryStatus) -> StoreResult<DeliveryStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StoreError::InvalidTransition {
                entity: "delivery",
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: "delivery status",
                value: s.to_string(),
            })
    }
}

/// Recipient details. Phone and address are masked in Debug output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingInfo {
    pub first_name: String,
    pub last_name: String,
    pub phone: Masked<String>,
    pub address: Masked<String>,
    pub city: String,
}

impl ShippingInfo {
    pub fn validate(&self) -> StoreResult<()> {
        let required = [
            ("first_name", self.first_name.as_str()),
            ("last_name", self.last_name.as_str()),
            ("phone", self.phone.0.as_str()),
            ("address", self.address.0.as_str()),
            ("city", self.city.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(StoreError::Validation(format!("shipping {} is required", field)));
        }
        if self.address.0.len() > 500 {
            return Err(StoreError::Validation(
                "shipping address must be less than 500 characters".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: DeliveryStatus,
    pub estimated_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub recipient: ShippingInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub recipient: ShippingInfo,
    pub status: DeliveryStatus,
    pub estimated_time: Option<DateTime<Utc>>,
}

impl NewDelivery {
    /// A pending delivery due `lead` after `placed_at`.
    pub fn scheduled(recipient: ShippingInfo, placed_at: DateTime<Utc>, lead: Duration) -> Self {
        Self {
            recipient,
            status: DeliveryStatus::Pending,
            estimated_time: Some(placed_at + lead),
        }
    }
}

/// Fully joined order as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<LineItemDetail>,
    pub delivery: Option<Delivery>,
}

impl OrderDetails {
    pub fn line_total_cents(&self) -> i64 {
        self.items.iter().map(|d| d.line.subtotal_cents()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_state_machine() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Delivered));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Pending));
        // Re-entering the current state is not a transition
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_delivery_state_machine() {
        use DeliveryStatus::*;

        assert!(Pending.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(Delivered));
        assert!(Pending.can_transition_to(Failed));
        assert!(InTransit.can_transition_to(Failed));

        let err = Pending.transition(Delivered).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { entity: "delivery", .. }));
        assert!(!Delivered.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!("in_transit".parse::<DeliveryStatus>().unwrap(), DeliveryStatus::InTransit);
        assert_eq!(serde_json::to_string(&DeliveryStatus::InTransit).unwrap(), "\"in_transit\"");
        assert_eq!(OrderStatus::Cancelled.to_string(), "cancelled");
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_line_item_subtotal() {
        let line = LineItem {
            order_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            quantity: 3,
            unit_price_cents: 1000,
        };
        assert_eq!(line.subtotal_cents(), 3000);

        let bad = NewLineItem { item_id: line.item_id, quantity: 0, unit_price_cents: 1000 };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_scheduled_delivery_eta() {
        let placed_at = Utc::now();
        let info = ShippingInfo {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            phone: Masked("555-0100".into()),
            address: Masked("12 Analytical Way".into()),
            city: "London".into(),
        };
        let delivery = NewDelivery::scheduled(info, placed_at, Duration::days(2));
        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert_eq!(delivery.estimated_time, Some(placed_at + Duration::days(2)));
    }
}

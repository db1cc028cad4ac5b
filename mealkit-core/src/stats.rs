use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{DeliveryStatus, OrderStatus};

/// Inclusive timestamp window; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    #[serde(flatten)]
    pub range: DateRange,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PopularityFilter {
    #[serde(flatten)]
    pub range: DateRange,
    pub status: Option<OrderStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryFilter {
    pub category: Option<String>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
}

/// Per-item aggregate over line items, ordered by `total_quantity` desc then `item_id` asc.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemPopularity {
    pub item_id: Uuid,
    pub name: String,
    pub times_ordered: i64,
    pub total_quantity: i64,
    pub average_price_cents: i64,
    pub total_revenue_cents: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderStatistics {
    pub total_orders: i64,
    pub pending_orders: i64,
    pub confirmed_orders: i64,
    pub delivered_orders: i64,
    pub cancelled_orders: i64,
    pub average_order_value_cents: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryStatistics {
    pub total_deliveries: i64,
    pub pending_deliveries: i64,
    pub in_transit_deliveries: i64,
    pub delivered_deliveries: i64,
    pub failed_deliveries: i64,
}

impl DeliveryStatistics {
    pub fn add(&mut self, status: DeliveryStatus, count: i64) {
        self.total_deliveries += count;
        match status {
            DeliveryStatus::Pending => self.pending_deliveries += count,
            DeliveryStatus::InTransit => self.in_transit_deliveries += count,
            DeliveryStatus::Delivered => self.delivered_deliveries += count,
            DeliveryStatus::Failed => self.failed_deliveries += count,
        }
    }
}

/// Per-account order totals. Cancelled orders are excluded from both counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerTotals {
    pub account_id: Uuid,
    pub name: String,
    pub email: String,
    pub order_count: i64,
    pub total_spent_cents: i64,
    pub last_order_at: Option<DateTime<Utc>>,
    pub subscribed: bool,
}

/// Admin dashboard headline numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_orders: i64,
    pub average_order_value_cents: i64,
    pub total_revenue_cents: i64,
}

/// Integer mean rounded half away from zero, matching `ROUND(AVG(x))` in Postgres.
pub fn rounded_mean(sum: i64, count: i64) -> i64 {
    if count == 0 {
        return 0;
    }
    let doubled = 2 * sum;
    if doubled >= 0 {
        (doubled + count) / (2 * count)
    } else {
        (doubled - count) / (2 * count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_date_range_bounds() {
        let now = Utc::now();
        let range = DateRange {
            from: Some(now - Duration::days(1)),
            to: Some(now),
        };
        assert!(range.contains(now));
        assert!(!range.contains(now + Duration::seconds(1)));
        assert!(DateRange::default().contains(now));
    }

    #[test]
    fn test_rounded_mean() {
        assert_eq!(rounded_mean(0, 0), 0);
        assert_eq!(rounded_mean(3000, 2), 1500);
        assert_eq!(rounded_mean(1001, 2), 501);
        assert_eq!(rounded_mean(1000, 3), 333);
    }
}

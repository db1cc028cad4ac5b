use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use mealkit_core::ShippingInfo;

use crate::error::{FulfillmentError, FulfillmentResult};

/// Where a checkout attempt is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPhase {
    Validating,
    Committing,
    Done,
    Aborted,
}

impl fmt::Display for CheckoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckoutPhase::Validating => "validating",
            CheckoutPhase::Committing => "committing",
            CheckoutPhase::Done => "done",
            CheckoutPhase::Aborted => "aborted",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: Uuid,
    pub quantity: i32,
}

/// A cart submitted for checkout. With `shipping` present the order is placed
/// confirmed and gets its delivery in the same unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CartLine>,
    #[serde(default)]
    pub shipping: Option<ShippingInfo>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub expected_total_cents: Option<i64>,
}

impl CheckoutRequest {
    pub fn cart(items: Vec<CartLine>) -> Self {
        Self {
            items,
            shipping: None,
            payment_method: None,
            expected_total_cents: None,
        }
    }

    pub fn with_shipping(mut self, shipping: ShippingInfo) -> Self {
        self.shipping = Some(shipping);
        self
    }

    /// Checks the request shape and returns its lines with repeated item ids
    /// merged, sorted by item id. Decrements run in this order.
    pub fn normalize(&self) -> FulfillmentResult<Vec<CartLine>> {
        if self.items.is_empty() {
            return Err(FulfillmentError::Validation(
                "order must contain at least one item".into(),
            ));
        }
        if let Some(shipping) = &self.shipping {
            shipping.validate()?;
        }
        if let Some(expected) = self.expected_total_cents {
            if expected < 0 {
                return Err(FulfillmentError::Validation(
                    "expected total must not be negative".into(),
                ));
            }
        }

        let mut merged: BTreeMap<Uuid, i32> = BTreeMap::new();
        for line in &self.items {
            if line.quantity <= 0 {
                return Err(FulfillmentError::Validation(format!(
                    "quantity for item {} must be positive",
                    line.item_id
                )));
            }
            let slot = merged.entry(line.item_id).or_insert(0);
            *slot = slot.checked_add(line.quantity).ok_or_else(|| {
                FulfillmentError::Validation(format!("quantity for item {} is too large", line.item_id))
            })?;
        }

        Ok(merged
            .into_iter()
            .map(|(item_id, quantity)| CartLine { item_id, quantity })
            .collect())
    }

    pub fn payment_label(&self) -> Option<&str> {
        self.payment_method
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
    }
}

use std::time::Duration;

use mealkit_core::{ErrorKind, StoreError};

use crate::checkout::CheckoutPhase;

#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Order total mismatch: expected {expected} cents, computed {computed} cents")]
    TotalMismatch { expected: i64, computed: i64 },

    #[error("Checkout timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Checkout aborted while {phase}: {source}")]
    Aborted {
        phase: CheckoutPhase,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FulfillmentError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        FulfillmentError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FulfillmentError::Validation(_) => ErrorKind::Validation,
            FulfillmentError::NotFound { .. } => ErrorKind::NotFound,
            FulfillmentError::TotalMismatch { .. } => ErrorKind::Conflict,
            FulfillmentError::TimedOut(_) => ErrorKind::Infrastructure,
            FulfillmentError::Aborted { source, .. } => source.kind(),
            FulfillmentError::Store(source) => source.kind(),
        }
    }

    /// Checkout phase the attempt failed in, when it failed inside one.
    pub fn phase(&self) -> Option<CheckoutPhase> {
        match self {
            FulfillmentError::Aborted { phase, .. } => Some(*phase),
            FulfillmentError::TotalMismatch { .. } => Some(CheckoutPhase::Validating),
            _ => None,
        }
    }
}

pub type FulfillmentResult<T> = Result<T, FulfillmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_store_source() {
        let err = FulfillmentError::Aborted {
            phase: CheckoutPhase::Committing,
            source: StoreError::InsufficientStock {
                item_id: uuid::Uuid::nil(),
                requested: 2,
                available: 1,
            },
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.phase(), Some(CheckoutPhase::Committing));

        let err: FulfillmentError = StoreError::Validation("bad".into()).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            FulfillmentError::TimedOut(Duration::from_millis(10)).kind(),
            ErrorKind::Infrastructure
        );
    }
}

pub mod models;
pub mod pii;
pub mod repository;
pub mod stats;

pub use models::{
    Account, Delivery, DeliveryStatus, InventoryItem, LineItem, LineItemDetail, NewAccount,
    NewDelivery, NewInventoryItem, NewLineItem, Order, OrderDetails, OrderStatus, Plan, Role,
    ShippingInfo,
};
pub use repository::StoreSet;

/// Coarse classification shared by every layer; the HTTP surface maps it to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Integrity,
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: uuid::Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Invalid {entity} status transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Storage failure: {0}")]
    Infrastructure(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::InsufficientStock { .. }
            | StoreError::InvalidTransition { .. }
            | StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::Integrity(_) => ErrorKind::Integrity,
            StoreError::Infrastructure(_) => ErrorKind::Infrastructure,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

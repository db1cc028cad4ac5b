use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use mealkit_core::{ErrorKind, StoreError};
use mealkit_order::FulfillmentError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InternalServerError(String),
}

impl AppError {
    fn from_kind(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::Validation => AppError::Validation(message),
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::Conflict | ErrorKind::Integrity => AppError::Conflict(message),
            ErrorKind::Infrastructure => AppError::InternalServerError(message),
        }
    }
}

impl From<FulfillmentError> for AppError {
    fn from(err: FulfillmentError) -> Self {
        if let Some(phase) = err.phase() {
            tracing::warn!(%phase, error = %err, "checkout rejected");
        }
        Self::from_kind(err.kind(), err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::from_kind(err.kind(), err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_store_errors_map_to_status_codes() {
        let cases = [
            (StoreError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (StoreError::not_found("order", Uuid::nil()), StatusCode::NOT_FOUND),
            (StoreError::Conflict("dup".into()), StatusCode::CONFLICT),
            (StoreError::Integrity("check".into()), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_total_mismatch_is_conflict() {
        let err = FulfillmentError::TotalMismatch {
            expected: 100,
            computed: 120,
        };
        assert_eq!(AppError::from(err).into_response().status(), StatusCode::CONFLICT);
    }
}

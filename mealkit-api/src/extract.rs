use axum::extract::FromRequest;

use crate::error::AppError;

/// `axum::Json` whose rejection is reported as a 400 in the usual error body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

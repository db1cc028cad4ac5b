use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mealkit_core::Role;

use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

/// Tokens are issued by the account service; this surface only validates them.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    /// Owner filter for order reads. Admins see every account's orders.
    pub fn scope(&self) -> Option<Uuid> {
        match self.role {
            Role::Admin => None,
            _ => Some(self.sub),
        }
    }
}

fn bearer_claims(req: &Request, secret: &str) -> Result<Claims, StatusCode> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| StatusCode::UNAUTHORIZED)
}

// ============================================================================
// Middleware
// ============================================================================

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims = bearer_claims(&req, &state.auth.secret)?;
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims = bearer_claims(&req, &state.auth.secret)?;
    if claims.role != Role::Admin {
        return Err(StatusCode::FORBIDDEN);
    }
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

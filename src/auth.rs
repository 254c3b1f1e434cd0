use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, serde::Deserialize)]
struct Claims {
    sub: String,
}

/// Resolve the acting user from the request headers.
///
/// Normal path: `Authorization: Bearer <jwt>` validated as HS256 against
/// JWT_SECRET, subject parsed as the user id. Dev path: an `x-user-id`
/// header, honored only when dev auth overrides are enabled outside
/// production.
pub fn require_user_id(state: &AppState, headers: &HeaderMap) -> Result<Uuid, AppError> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(raw) = headers.get("x-user-id").and_then(|v| v.to_str().ok()) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Uuid::parse_str(trimmed).map_err(|_| {
                    AppError::Unauthorized("x-user-id is not a valid user id.".to_string())
                });
            }
        }
    }

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token.".to_string()))?;

    let secret = state
        .config
        .jwt_secret
        .as_deref()
        .ok_or_else(|| AppError::Dependency("JWT_SECRET is not configured.".to_string()))?;

    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token.".to_string()))?;

    Uuid::parse_str(data.claims.sub.trim())
        .map_err(|_| AppError::Unauthorized("Token subject is not a valid user id.".to_string()))
}

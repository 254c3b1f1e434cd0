use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::auth::require_user_id;
use crate::error::{AppError, AppResult};
use crate::repository::rentals;
use crate::schemas::{validate_input, PreRentalPath, VerifyAccessInput};
use crate::services::capability;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/pre-rentals/{pre_rental_id}/access-key",
            axum::routing::post(issue_access_key),
        )
        .route(
            "/public/pre-rentals/{pre_rental_id}/verify-access",
            axum::routing::post(verify_access_key),
        )
}

/// Issue an access key for a draft rental, for handing to the prospective
/// tenant (e.g. inside a link). Restricted to the record's creator and the
/// property's managers.
async fn issue_access_key(
    State(state): State<AppState>,
    Path(path): Path<PreRentalPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let record = rentals::get_pre_rental(pool, path.pre_rental_id).await?;
    let is_creator = record.created_by_user_id == user_id;
    let is_manager = rentals::is_property_manager(pool, record.property_id, user_id).await?;
    if !is_creator && !is_manager {
        return Err(AppError::Forbidden(
            "Forbidden: cannot issue access keys for this pre-rental.".to_string(),
        ));
    }

    let key = capability::issue_access_key(&state.config.access_key_secret, &record)?;
    tracing::info!(pre_rental_id = %record.id, "Issued pre-rental access key");

    Ok(Json(json!({ "key": key })))
}

/// Verify a presented access key. Unauthenticated: the key itself is the
/// credential. On success the caller gets the draft record it is bound to.
async fn verify_access_key(
    State(state): State<AppState>,
    Path(path): Path<PreRentalPath>,
    Json(input): Json<VerifyAccessInput>,
) -> AppResult<Json<Value>> {
    validate_input(&input)?;
    let pool = db_pool(&state)?;

    let record = rentals::get_pre_rental(pool, path.pre_rental_id).await?;
    capability::verify_access_key(&state.config.access_key_secret, &record, &input.key)?;

    Ok(Json(json!({
        "valid": true,
        "pre_rental": record,
    })))
}

fn db_pool(state: &AppState) -> Result<&sqlx::PgPool, AppError> {
    state
        .db_pool
        .as_ref()
        .ok_or_else(|| AppError::Dependency("Database is not configured.".to_string()))
}

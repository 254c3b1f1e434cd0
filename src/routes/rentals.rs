use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::auth::require_user_id;
use crate::error::{AppError, AppResult};
use crate::model::PaymentStatus;
use crate::repository::{payments, rentals};
use crate::routes::payments::payment_view;
use crate::schemas::{clamp_limit_in_range, PaymentsQuery, RentalPath};
use crate::services::{fines, planner};
use crate::state::AppState;
use crate::tenancy;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/rentals/{rental_id}", axum::routing::get(get_rental))
        .route(
            "/rentals/{rental_id}/payments",
            axum::routing::get(list_rental_payments),
        )
        .route(
            "/rentals/{rental_id}/payments/plan",
            axum::routing::post(plan_rental_payments),
        )
        .route(
            "/rentals/{rental_id}/payments/fines",
            axum::routing::post(sweep_rental_fines),
        )
}

async fn get_rental(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let rental = rentals::get_rental(pool, path.rental_id).await?;
    let side = tenancy::assert_rental_party(pool, &rental, user_id).await?;

    Ok(Json(json!({
        "rental": rental,
        "side": side.as_str(),
    })))
}

async fn list_rental_payments(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    Query(query): Query<PaymentsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let rental = rentals::get_rental(pool, path.rental_id).await?;
    tenancy::assert_rental_party(pool, &rental, user_id).await?;

    let status = match query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        Some(raw) => match PaymentStatus::parse(raw) {
            Some(parsed) => Some(parsed.as_str()),
            None => {
                return Err(AppError::BadRequest(format!(
                    "Unknown status '{raw}'. Expected one of: {}.",
                    PaymentStatus::ALL.map(PaymentStatus::as_str).join(", ")
                )))
            }
        },
        None => None,
    };
    let mut rows = payments::list_rental_payments(
        pool,
        path.rental_id,
        status,
        clamp_limit_in_range(query.limit, 1, 1000),
    )
    .await?;

    if let Some(due_from) = query.due_from {
        rows.retain(|row| row.expiry_date.is_some_and(|due| due >= due_from));
    }
    if let Some(due_to) = query.due_to {
        rows.retain(|row| row.expiry_date.is_some_and(|due| due <= due_to));
    }

    let data: Vec<Value> = rows.iter().map(payment_view).collect();
    Ok(Json(json!({ "data": data })))
}

/// Manual invocation of the per-rental planning pass.
async fn plan_rental_payments(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let rental = rentals::get_rental(pool, path.rental_id).await?;
    tenancy::assert_rental_landlord(pool, &rental, user_id).await?;

    let created = planner::plan_rental_payment(pool, path.rental_id).await?;
    Ok(Json(json!({ "created": created })))
}

/// Manual invocation of the per-rental overdue sweep.
async fn sweep_rental_fines(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let rental = rentals::get_rental(pool, path.rental_id).await?;
    tenancy::assert_rental_landlord(pool, &rental, user_id).await?;

    let result = fines::run_fine_sweep(&state, Some(path.rental_id)).await;
    Ok(Json(json!(result)))
}

fn db_pool(state: &AppState) -> Result<&sqlx::PgPool, AppError> {
    state
        .db_pool
        .as_ref()
        .ok_or_else(|| AppError::Dependency("Database is not configured.".to_string()))
}

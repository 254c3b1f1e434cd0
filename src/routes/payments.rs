use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Map, Value};

use crate::auth::require_user_id;
use crate::error::{AppError, AppResult};
use crate::model::RentalPayment;
use crate::repository::{payments, table_service};
use crate::schemas::{PaymentPath, TransitionInput};
use crate::services::lifecycle;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/payments/{payment_id}",
            axum::routing::get(get_payment),
        )
        .route(
            "/payments/{payment_id}/transition",
            axum::routing::post(transition_payment),
        )
        .route(
            "/payments/{payment_id}/events",
            axum::routing::get(list_payment_events),
        )
}

async fn get_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let payment = payments::get_payment(pool, path.payment_id).await?;
    lifecycle::resolve_payment_party(&state, &payment, &headers).await?;

    Ok(Json(payment_view(&payment)))
}

async fn transition_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
    Json(input): Json<TransitionInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let outcome = lifecycle::apply_transition(&state, path.payment_id, user_id, &input).await?;

    Ok(Json(json!({
        "payment": payment_view(&outcome.payment),
        "old_status": outcome.old_status.as_str(),
        "new_status": outcome.new_status.as_str(),
        "acting_side": outcome.acting_side.as_str(),
    })))
}

async fn list_payment_events(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let payment = payments::get_payment(pool, path.payment_id).await?;
    lifecycle::resolve_payment_party(&state, &payment, &headers).await?;

    let mut filters = Map::new();
    filters.insert(
        "payment_id".to_string(),
        Value::String(path.payment_id.to_string()),
    );
    let events = table_service::list_rows(
        pool,
        "payment_events",
        Some(&filters),
        200,
        0,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": events })))
}

/// Serialized payment plus the always-derived outstanding balance.
pub(crate) fn payment_view(payment: &RentalPayment) -> Value {
    let mut view = serde_json::to_value(payment).unwrap_or(Value::Null);
    if let Some(object) = view.as_object_mut() {
        object.insert("must_pay".to_string(), json!(payment.must_pay()));
    }
    view
}

fn db_pool(state: &AppState) -> Result<&sqlx::PgPool, AppError> {
    state
        .db_pool
        .as_ref()
        .ok_or_else(|| AppError::Dependency("Database is not configured.".to_string()))
}

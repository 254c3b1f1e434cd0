use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::services::scheduler;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/internal/run-daily-jobs",
        axum::routing::post(run_daily_jobs),
    )
}

/// Operator trigger for the daily planning + fine pass, equivalent to one
/// scheduler tick. Guarded by the internal API key.
async fn run_daily_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_internal_key(&state, &headers)?;
    let summary = scheduler::run_daily_payment_jobs(&state).await;
    Ok(Json(summary))
}

fn require_internal_key(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = state.config.internal_api_key.as_deref() else {
        return Err(AppError::Forbidden(
            "Internal endpoints are disabled.".to_string(),
        ));
    };

    let presented = headers
        .get("x-internal-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    if presented != expected {
        return Err(AppError::Unauthorized("Invalid internal API key.".to_string()));
    }
    Ok(())
}

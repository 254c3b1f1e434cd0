use std::time::Duration;

use chrono::{Datelike, Timelike, Utc};
use tokio::time::sleep;

use crate::state::AppState;

/// Spawn-once background scheduler owned by the composition root.
///
/// Runs the daily payment jobs (planning pass, then fine sweep) once per
/// calendar day at or after the configured UTC hour. Each run executes in
/// its own `tokio::spawn` so a failure never crashes the scheduler loop.
/// With multiple replicas the jobs can race, but both are idempotent at
/// the row level (code-keyed inserts, status-conditional updates).
pub async fn run_background_scheduler(state: AppState) {
    tracing::info!("Background scheduler started");

    if state.db_pool.is_none() {
        tracing::warn!("Scheduler: no database pool configured, exiting");
        return;
    }

    let mut last_daily_run: Option<u32> = None;

    loop {
        sleep(Duration::from_secs(15)).await;

        let now_utc = Utc::now();
        let today = now_utc.date_naive();

        let today_ordinal = today.ordinal();
        if last_daily_run == Some(today_ordinal) {
            continue;
        }
        if now_utc.hour() < state.config.daily_jobs_hour_utc {
            continue;
        }

        last_daily_run = Some(today_ordinal);
        tracing::info!("Scheduler: running daily payment jobs for {today}");

        let st = state.clone();
        tokio::spawn(async move {
            run_daily_payment_jobs(&st).await;
        });
    }
}

/// One daily pass: plan upcoming cycles first, then sweep overdue rows.
/// Shared by the scheduler and the internal operator endpoint.
pub async fn run_daily_payment_jobs(state: &AppState) -> serde_json::Value {
    let plan = crate::services::planner::plan_rental_payments(state).await;
    let fines = crate::services::fines::run_fine_sweep(state, None).await;

    tracing::info!(
        planned = plan.planned,
        fined = fines.fined,
        "Scheduler: daily payment jobs completed"
    );

    serde_json::json!({
        "plan": plan,
        "fines": fines,
    })
}

use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{PaymentStatus, PenaltyScheme};
use crate::repository::payments::{self, OverdueCandidate, PaymentPatch};
use crate::services::events;
use crate::state::AppState;

/// Result of one overdue sweep run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FineSweepResult {
    pub scanned: u32,
    pub fined: u32,
    pub skipped: u32,
    pub errors: u32,
}

/// Penalty owed on an outstanding balance under the rental's scheme.
pub fn fine_amount(due: f64, scheme: PenaltyScheme, penalty_amount: f64) -> f64 {
    match scheme {
        PenaltyScheme::None => due,
        PenaltyScheme::Fixed => due + penalty_amount,
        PenaltyScheme::Percent => due * (1.0 + penalty_amount / 100.0),
    }
}

/// Whether a payment's due date, extended by the rental's grace period,
/// has passed.
pub fn is_past_grace(expiry_date: NaiveDate, grace_period_days: i32, today: NaiveDate) -> bool {
    expiry_date + Duration::days(i64::from(grace_period_days)) < today
}

/// Sweep overdue payments into PAYFINE, computing the penalty for each.
///
/// Safe to re-run: rows already in PAYFINE are never selected, and the
/// status write is conditional on the status the row was selected with, so
/// a concurrent transition simply makes this row a skip.
pub async fn run_fine_sweep(state: &AppState, rental_id: Option<Uuid>) -> FineSweepResult {
    let mut result = FineSweepResult {
        scanned: 0,
        fined: 0,
        skipped: 0,
        errors: 0,
    };

    let pool = match state.db_pool.as_ref() {
        Some(pool) => pool,
        None => {
            tracing::warn!("Fine sweep: no database pool configured");
            result.errors += 1;
            return result;
        }
    };

    let candidates = match payments::list_fine_candidates(pool, rental_id).await {
        Ok(rows) => rows,
        Err(error) => {
            tracing::warn!(error = %error, "Fine sweep: failed to fetch candidates");
            result.errors += 1;
            return result;
        }
    };

    let today = Utc::now().date_naive();

    for candidate in candidates {
        result.scanned += 1;
        match apply_fine(state, pool, &candidate, today).await {
            Ok(true) => result.fined += 1,
            Ok(false) => result.skipped += 1,
            Err(error) => {
                tracing::warn!(
                    payment_id = %candidate.payment.id,
                    error = %error,
                    "Fine sweep: failed to update payment"
                );
                result.errors += 1;
            }
        }
    }

    tracing::info!(
        scanned = result.scanned,
        fined = result.fined,
        skipped = result.skipped,
        errors = result.errors,
        "Fine sweep completed"
    );
    result
}

async fn apply_fine(
    state: &AppState,
    pool: &sqlx::PgPool,
    candidate: &OverdueCandidate,
    today: NaiveDate,
) -> Result<bool, AppError> {
    let payment = &candidate.payment;

    let due = payment.amount - payment.discount.unwrap_or(0.0) - payment.paid;
    if due <= 0.0 {
        return Ok(false);
    }

    let Some(expiry_date) = payment.expiry_date else {
        return Ok(false);
    };
    if !is_past_grace(expiry_date, candidate.grace_period_days, today) {
        return Ok(false);
    }

    let Some(old_status) = payment.status() else {
        return Ok(false);
    };
    let scheme = PenaltyScheme::parse(&candidate.penalty_scheme)
        .unwrap_or(PenaltyScheme::None);
    let fine = fine_amount(due, scheme, candidate.penalty_amount);

    let patch = PaymentPatch {
        fine: Some(fine),
        ..PaymentPatch::default()
    };
    let updated = payments::update_payment_status(
        pool,
        payment.id,
        old_status.as_str(),
        PaymentStatus::PayFine.as_str(),
        &patch,
        None,
    )
    .await?;

    match updated {
        Some(updated) => {
            events::record_payment_event(
                state,
                updated.rental_id,
                updated.id,
                old_status,
                PaymentStatus::PayFine,
                None,
            )
            .await;
            Ok(true)
        }
        // A transition won the race between select and update.
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fine_formulas_match_the_penalty_schemes() {
        assert!((fine_amount(100.0, PenaltyScheme::None, 20.0) - 100.0).abs() < f64::EPSILON);
        assert!((fine_amount(100.0, PenaltyScheme::Fixed, 20.0) - 120.0).abs() < f64::EPSILON);
        assert!((fine_amount(100.0, PenaltyScheme::Percent, 10.0) - 110.0).abs() < f64::EPSILON);
    }

    #[test]
    fn grace_period_boundary_is_exclusive() {
        let expiry = date(2021, 3, 1);
        // expiry + 5 days = Mar 6: not overdue on Mar 6, overdue on Mar 7.
        assert!(!is_past_grace(expiry, 5, date(2021, 3, 6)));
        assert!(is_past_grace(expiry, 5, date(2021, 3, 7)));
        // Zero grace: overdue the day after expiry.
        assert!(!is_past_grace(expiry, 0, date(2021, 3, 1)));
        assert!(is_past_grace(expiry, 0, date(2021, 3, 2)));
    }
}

use chrono::{Months, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{PaymentCategory, Rental};
use crate::repository::{payments, rentals};
use crate::services::payment_code::payment_code;
use crate::services::proration::cycle_price;
use crate::state::AppState;

/// Result of one planning pass over all in-progress rentals.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlanBatchResult {
    pub rentals: u32,
    pub planned: u32,
    pub skipped: u32,
    pub errors: u32,
}

/// A charge the planner wants to materialize for one billing cycle.
#[derive(Debug, Clone, PartialEq)]
struct PlannedCharge {
    category: PaymentCategory,
    amount: f64,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

/// Billing cycle grid for a rental: `start_date` stepped by the payment
/// basis, clamped to the contractual end, cut off one basis cycle past
/// `today` so the daily pass always has the next cycle ready without
/// flooding the future.
fn billing_cycles(rental: &Rental, today: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let basis = rental.payment_basis_months.max(1) as u32;
    let period = rental.rental_period_months.max(0) as u32;

    let Some(rental_end) = rental.start_date.checked_add_months(Months::new(period)) else {
        return Vec::new();
    };
    let Some(horizon) = today.checked_add_months(Months::new(basis)) else {
        return Vec::new();
    };

    let mut cycles = Vec::new();
    let mut cursor = rental.start_date;
    while cursor < rental_end && cursor <= horizon {
        let next = match cursor.checked_add_months(Months::new(basis)) {
            Some(candidate) if candidate <= rental_end => candidate,
            // Final (possibly partial) cycle.
            _ => rental_end,
        };
        cycles.push((cursor, next));
        cursor = next;
    }
    cycles
}

/// Charges for one cycle: rent always, utilities and service fees when the
/// rental carries them, the deposit once on the first cycle. Amounts are
/// prorated when the cycle is shorter than the basis.
fn cycle_charges(
    rental: &Rental,
    start_date: NaiveDate,
    end_date: NaiveDate,
    is_first_cycle: bool,
) -> Vec<PlannedCharge> {
    let basis = rental.payment_basis_months.max(1) as u32;
    let mut charges = vec![PlannedCharge {
        category: PaymentCategory::Rental,
        amount: cycle_price(start_date, end_date, basis, rental.rental_price),
        start_date,
        end_date,
    }];

    let metered = [
        (PaymentCategory::Electricity, rental.electricity_fee),
        (PaymentCategory::Water, rental.water_fee),
        (PaymentCategory::Services, rental.service_fee),
    ];
    for (category, fee) in metered {
        if let Some(fee) = fee.filter(|fee| *fee > 0.0) {
            charges.push(PlannedCharge {
                category,
                amount: cycle_price(start_date, end_date, basis, fee),
                start_date,
                end_date,
            });
        }
    }

    if is_first_cycle {
        if let Some(deposit) = rental.deposit_amount.filter(|deposit| *deposit > 0.0) {
            charges.push(PlannedCharge {
                category: PaymentCategory::Deposit,
                amount: deposit,
                start_date,
                end_date,
            });
        }
    }

    charges
}

/// Materialize PLAN rows for a single rental. Returns the ids of rows
/// actually inserted; cycles whose code already exists are skipped, so
/// re-running after a partial failure never duplicates a payment.
pub async fn plan_rental_payment(pool: &PgPool, rental_id: Uuid) -> Result<Vec<Uuid>, AppError> {
    let rental = rentals::get_rental(pool, rental_id).await?;
    plan_rental(pool, &rental, Utc::now().date_naive()).await
}

async fn plan_rental(
    pool: &PgPool,
    rental: &Rental,
    today: NaiveDate,
) -> Result<Vec<Uuid>, AppError> {
    if !rental.is_in_progress() {
        return Ok(Vec::new());
    }

    let mut created = Vec::new();
    for (index, (start_date, end_date)) in billing_cycles(rental, today).into_iter().enumerate() {
        for charge in cycle_charges(rental, start_date, end_date, index == 0) {
            let code = payment_code(rental.id, charge.category, charge.start_date, charge.end_date);
            let inserted = payments::insert_planned_payment(
                pool,
                rental.id,
                charge.category,
                &code,
                charge.amount,
                charge.start_date,
                charge.end_date,
            )
            .await?;
            if let Some(payment) = inserted {
                created.push(payment.id);
            }
        }
    }

    if !created.is_empty() {
        tracing::info!(
            rental_id = %rental.id,
            planned = created.len(),
            "Planned new payment rows"
        );
    }
    Ok(created)
}

/// The daily batch pass over every in-progress rental.
pub async fn plan_rental_payments(state: &AppState) -> PlanBatchResult {
    let mut result = PlanBatchResult {
        rentals: 0,
        planned: 0,
        skipped: 0,
        errors: 0,
    };

    let pool = match state.db_pool.as_ref() {
        Some(pool) => pool,
        None => {
            tracing::warn!("Payment planner: no database pool configured");
            result.errors += 1;
            return result;
        }
    };

    let rentals = match rentals::list_in_progress_rentals(pool).await {
        Ok(rows) => rows,
        Err(error) => {
            tracing::warn!(error = %error, "Payment planner: failed to list rentals");
            result.errors += 1;
            return result;
        }
    };

    let today = Utc::now().date_naive();
    for rental in &rentals {
        result.rentals += 1;
        match plan_rental(pool, rental, today).await {
            Ok(created) if created.is_empty() => result.skipped += 1,
            Ok(created) => result.planned += created.len() as u32,
            Err(error) => {
                tracing::warn!(rental_id = %rental.id, error = %error, "Payment planner: rental failed");
                result.errors += 1;
            }
        }
    }

    tracing::info!(
        rentals = result.rentals,
        planned = result.planned,
        skipped = result.skipped,
        errors = result.errors,
        "Payment planning pass completed"
    );
    result
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rental(start: NaiveDate, period_months: i32, basis_months: i32) -> Rental {
        let now: DateTime<Utc> = Utc::now();
        Rental {
            id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            unit_id: None,
            tenant_user_id: Uuid::new_v4(),
            start_date: start,
            move_in_date: Some(start),
            rental_period_months: period_months,
            rental_price: 1000.0,
            payment_basis_months: basis_months,
            grace_period_days: 5,
            penalty_scheme: "NONE".to_string(),
            penalty_amount: 0.0,
            deposit_amount: None,
            electricity_fee: None,
            water_fee: None,
            service_fee: None,
            status: "INPROGRESS".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn cycles_step_by_basis_and_clamp_to_rental_end() {
        let r = rental(date(2021, 1, 1), 6, 2);
        // Far past the rental: every cycle is in view.
        let cycles = billing_cycles(&r, date(2022, 1, 1));
        assert_eq!(
            cycles,
            vec![
                (date(2021, 1, 1), date(2021, 3, 1)),
                (date(2021, 3, 1), date(2021, 5, 1)),
                (date(2021, 5, 1), date(2021, 7, 1)),
            ]
        );
    }

    #[test]
    fn final_partial_cycle_is_clamped() {
        let r = rental(date(2021, 1, 1), 5, 2);
        let cycles = billing_cycles(&r, date(2022, 1, 1));
        assert_eq!(cycles.last(), Some(&(date(2021, 5, 1), date(2021, 6, 1))));
    }

    #[test]
    fn horizon_limits_lookahead_to_one_basis_cycle() {
        let r = rental(date(2021, 1, 1), 12, 1);
        let cycles = billing_cycles(&r, date(2021, 1, 15));
        // Cycles starting up to Feb 15: January and February only.
        assert_eq!(
            cycles,
            vec![
                (date(2021, 1, 1), date(2021, 2, 1)),
                (date(2021, 2, 1), date(2021, 3, 1)),
            ]
        );
    }

    #[test]
    fn first_cycle_carries_deposit_and_configured_fees() {
        let mut r = rental(date(2021, 1, 1), 12, 1);
        r.deposit_amount = Some(2000.0);
        r.water_fee = Some(60.0);

        let first = cycle_charges(&r, date(2021, 1, 1), date(2021, 2, 1), true);
        let categories: Vec<_> = first.iter().map(|c| c.category).collect();
        assert_eq!(
            categories,
            vec![
                PaymentCategory::Rental,
                PaymentCategory::Water,
                PaymentCategory::Deposit,
            ]
        );

        let later = cycle_charges(&r, date(2021, 2, 1), date(2021, 3, 1), false);
        assert!(later.iter().all(|c| c.category != PaymentCategory::Deposit));
    }

    #[test]
    fn partial_final_cycle_is_prorated() {
        let r = rental(date(2021, 1, 1), 1, 2);
        // One-month rental on a two-month basis: a single clamped cycle.
        let cycles = billing_cycles(&r, date(2021, 1, 1));
        assert_eq!(cycles, vec![(date(2021, 1, 1), date(2021, 2, 1))]);

        let charges = cycle_charges(&r, date(2021, 1, 1), date(2021, 2, 1), true);
        // 31 days of a 60-day (2 × 30) basis.
        assert!((charges[0].amount - 1000.0 * 31.0 / 60.0).abs() < 1e-9);
    }
}

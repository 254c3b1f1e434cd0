use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{PaymentCategory, RentalPayment};

const PAYMENT_COLUMNS: &str = "id, code, rental_id, category, amount, discount, fine, paid, status, \
     start_date, end_date, expiry_date, payment_date, note, updated_by, created_at, updated_at";

/// Fields a lifecycle transition or fine application may set alongside the
/// status. `None` leaves the stored value untouched.
#[derive(Debug, Default, Clone)]
pub struct PaymentPatch {
    pub amount: Option<f64>,
    pub discount: Option<f64>,
    pub fine: Option<f64>,
    pub expiry_date: Option<NaiveDate>,
    pub payment_date: Option<NaiveDate>,
    pub note: Option<String>,
}

pub async fn get_payment(pool: &PgPool, payment_id: Uuid) -> Result<RentalPayment, AppError> {
    sqlx::query_as::<_, RentalPayment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM rental_payments WHERE id = $1"
    ))
    .bind(payment_id)
    .fetch_optional(pool)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Payment not found.".to_string()))
}

pub async fn list_rental_payments(
    pool: &PgPool,
    rental_id: Uuid,
    status: Option<&str>,
    limit: i64,
) -> Result<Vec<RentalPayment>, AppError> {
    sqlx::query_as::<_, RentalPayment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM rental_payments
         WHERE rental_id = $1 AND ($2::text IS NULL OR status = $2)
         ORDER BY start_date, category
         LIMIT $3"
    ))
    .bind(rental_id)
    .bind(status)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
    .map_err(map_db_error)
}

/// Insert a freshly planned payment row in state PLAN.
///
/// The payment code is the idempotency key: a row whose code already exists
/// is left untouched and `None` is returned, which makes re-running the
/// planner safe.
pub async fn insert_planned_payment(
    pool: &PgPool,
    rental_id: Uuid,
    category: PaymentCategory,
    code: &str,
    amount: f64,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Option<RentalPayment>, AppError> {
    sqlx::query_as::<_, RentalPayment>(&format!(
        "INSERT INTO rental_payments
             (id, code, rental_id, category, amount, paid, status, start_date, end_date)
         VALUES ($1, $2, $3, $4, $5, 0, 'PLAN', $6, $7)
         ON CONFLICT (code) DO NOTHING
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(code)
    .bind(rental_id)
    .bind(category.as_str())
    .bind(amount)
    .bind(start_date)
    .bind(end_date)
    .fetch_optional(pool)
    .await
    .map_err(map_db_error)
}

/// The conditional-update primitive behind every status change.
///
/// The expected status is part of the WHERE clause, so the compare and the
/// write happen in one atomic statement; two racing callers can never both
/// win. `Ok(None)` means the row was not in `expected_status` at write time.
pub async fn update_payment_status(
    pool: &PgPool,
    payment_id: Uuid,
    expected_status: &str,
    new_status: &str,
    patch: &PaymentPatch,
    updated_by: Option<Uuid>,
) -> Result<Option<RentalPayment>, AppError> {
    sqlx::query_as::<_, RentalPayment>(&format!(
        "UPDATE rental_payments SET
             status = $3,
             amount = COALESCE($4, amount),
             discount = COALESCE($5, discount),
             fine = COALESCE($6, fine),
             expiry_date = COALESCE($7, expiry_date),
             payment_date = COALESCE($8, payment_date),
             note = COALESCE($9, note),
             updated_by = COALESCE($10, updated_by),
             updated_at = now()
         WHERE id = $1 AND status = $2
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(payment_id)
    .bind(expected_status)
    .bind(new_status)
    .bind(patch.amount)
    .bind(patch.discount)
    .bind(patch.fine)
    .bind(patch.expiry_date)
    .bind(patch.payment_date)
    .bind(patch.note.as_deref())
    .bind(updated_by)
    .fetch_optional(pool)
    .await
    .map_err(map_db_error)
}

/// A payment row joined with the rental fields the fine sweep needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OverdueCandidate {
    #[sqlx(flatten)]
    pub payment: RentalPayment,
    pub grace_period_days: i32,
    pub penalty_scheme: String,
    pub penalty_amount: f64,
}

/// Rows the fine sweep should look at. The date/balance predicate is
/// evaluated by the caller; this only narrows by status and rental.
pub async fn list_fine_candidates(
    pool: &PgPool,
    rental_id: Option<Uuid>,
) -> Result<Vec<OverdueCandidate>, AppError> {
    sqlx::query_as::<_, OverdueCandidate>(&format!(
        "SELECT {prefixed}, r.grace_period_days, r.penalty_scheme, r.penalty_amount
         FROM rental_payments p
         JOIN rentals r ON r.id = p.rental_id
         WHERE p.status IN ('PENDING', 'REQUEST2PAY', 'PARTIALLYPAID')
           AND p.expiry_date IS NOT NULL
           AND ($1::uuid IS NULL OR p.rental_id = $1)
         ORDER BY p.expiry_date
         LIMIT 500",
        prefixed = prefixed_payment_columns("p")
    ))
    .bind(rental_id)
    .fetch_all(pool)
    .await
    .map_err(map_db_error)
}

fn prefixed_payment_columns(alias: &str) -> String {
    PAYMENT_COLUMNS
        .split(", ")
        .map(|column| format!("{alias}.{}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn map_db_error(error: sqlx::Error) -> AppError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");

    if message.contains("23505")
        || message
            .to_ascii_lowercase()
            .contains("duplicate key value violates unique constraint")
    {
        return AppError::Conflict("Duplicate value violates a unique constraint.".to_string());
    }
    AppError::Dependency("Database operation failed.".to_string())
}

#[cfg(test)]
mod tests {
    use super::prefixed_payment_columns;

    #[test]
    fn prefixes_every_payment_column() {
        let prefixed = prefixed_payment_columns("p");
        assert!(prefixed.starts_with("p.id, p.code"));
        assert!(prefixed.contains("p.expiry_date"));
        assert!(!prefixed.contains(" id,"));
    }
}

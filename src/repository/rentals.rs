use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{PreRental, Rental};

const RENTAL_COLUMNS: &str = "id, property_id, unit_id, tenant_user_id, start_date, move_in_date, \
     rental_period_months, rental_price, payment_basis_months, grace_period_days, \
     penalty_scheme, penalty_amount, deposit_amount, electricity_fee, water_fee, service_fee, \
     status, created_at, updated_at";

pub async fn get_rental(pool: &PgPool, rental_id: Uuid) -> Result<Rental, AppError> {
    sqlx::query_as::<_, Rental>(&format!(
        "SELECT {RENTAL_COLUMNS} FROM rentals WHERE id = $1"
    ))
    .bind(rental_id)
    .fetch_optional(pool)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Rental not found.".to_string()))
}

/// All rentals the daily planning/fine pass should consider.
pub async fn list_in_progress_rentals(pool: &PgPool) -> Result<Vec<Rental>, AppError> {
    sqlx::query_as::<_, Rental>(&format!(
        "SELECT {RENTAL_COLUMNS} FROM rentals WHERE status = 'INPROGRESS' ORDER BY created_at LIMIT 500"
    ))
    .fetch_all(pool)
    .await
    .map_err(map_db_error)
}

/// Whether `user_id` belongs to the management group of `property_id`.
pub async fn is_property_manager(
    pool: &PgPool,
    property_id: Uuid,
    user_id: Uuid,
) -> Result<bool, AppError> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(
             SELECT 1 FROM property_managers
             WHERE property_id = $1 AND user_id = $2
         )",
    )
    .bind(property_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
    .map_err(map_db_error)
}

pub async fn get_pre_rental(pool: &PgPool, pre_rental_id: Uuid) -> Result<PreRental, AppError> {
    sqlx::query_as::<_, PreRental>(
        "SELECT id, created_by_user_id, property_id, unit_id, tenant_full_name, tenant_email, \
                tenant_phone, created_at
         FROM pre_rentals WHERE id = $1",
    )
    .bind(pre_rental_id)
    .fetch_optional(pool)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Pre-rental not found.".to_string()))
}

fn map_db_error(error: sqlx::Error) -> AppError {
    tracing::error!(db_error = %error, "Database query failed");
    AppError::Dependency("Database operation failed.".to_string())
}

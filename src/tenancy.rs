use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{Rental, Side};
use crate::repository::rentals;

/// Resolve which contractual party `user_id` represents for this rental.
///
/// Manager membership can change between requests, so this hits storage on
/// every call instead of caching.
pub async fn resolve_side(
    pool: &PgPool,
    rental: &Rental,
    user_id: Uuid,
) -> Result<Side, AppError> {
    if rentals::is_property_manager(pool, rental.property_id, user_id).await? {
        return Ok(Side::Landlord);
    }
    if rental.tenant_user_id == user_id {
        return Ok(Side::Tenant);
    }
    Ok(Side::Unrelated)
}

/// Reads on a rental are open to both parties, closed to everyone else.
pub async fn assert_rental_party(
    pool: &PgPool,
    rental: &Rental,
    user_id: Uuid,
) -> Result<Side, AppError> {
    match resolve_side(pool, rental, user_id).await? {
        Side::Unrelated => Err(AppError::Forbidden(
            "Forbidden: not a party to this rental.".to_string(),
        )),
        side => Ok(side),
    }
}

/// Planning and fine sweeps are landlord-side management actions.
pub async fn assert_rental_landlord(
    pool: &PgPool,
    rental: &Rental,
    user_id: Uuid,
) -> Result<(), AppError> {
    match resolve_side(pool, rental, user_id).await? {
        Side::Landlord => Ok(()),
        _ => Err(AppError::Forbidden(
            "Forbidden: requires a property manager of this rental.".to_string(),
        )),
    }
}

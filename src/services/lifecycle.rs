use uuid::Uuid;

use crate::auth;
use crate::error::AppError;
use crate::model::{PaymentStatus, RentalPayment, Side};
use crate::repository::payments::{self, PaymentPatch};
use crate::repository::rentals;
use crate::schemas::TransitionInput;
use crate::services::events;
use crate::state::AppState;
use crate::tenancy;

/// All causes collapse into one public message so callers cannot probe
/// which check failed.
const TRANSITION_DENIED: &str = "Invalid payment transition.";

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub payment: RentalPayment,
    pub old_status: PaymentStatus,
    pub new_status: PaymentStatus,
    pub acting_side: Side,
}

/// The closed transition table: which row state each action starts from,
/// which party may perform it, and where it lands.
///
/// The side pairing is contractual and must not be "fixed": issued rows
/// are answered by the tenant, reported payments are confirmed by the
/// landlord, and PARTIALLYPAID/PAYFINE rows have no direct action at all
/// (only the fine sweep and external settlement bookkeeping touch them).
pub(crate) fn authorize(
    current: PaymentStatus,
    side: Side,
    input: &TransitionInput,
) -> Result<PaymentStatus, AppError> {
    let (expected, required_side, target) = match input {
        TransitionInput::Issue { .. } => (PaymentStatus::Plan, Side::Landlord, PaymentStatus::Issued),
        TransitionInput::MarkPaid { .. } => (PaymentStatus::Plan, Side::Landlord, PaymentStatus::Paid),
        TransitionInput::Cancel { .. } => {
            (PaymentStatus::Plan, Side::Landlord, PaymentStatus::Cancelled)
        }
        TransitionInput::Accept { .. } => {
            (PaymentStatus::Issued, Side::Tenant, PaymentStatus::Pending)
        }
        TransitionInput::SendBack { .. } => {
            (PaymentStatus::Issued, Side::Tenant, PaymentStatus::Plan)
        }
        TransitionInput::ReportPayment { .. } => {
            (PaymentStatus::Pending, Side::Tenant, PaymentStatus::Request2Pay)
        }
        TransitionInput::ConfirmPayment { .. } => {
            (PaymentStatus::Request2Pay, Side::Landlord, PaymentStatus::Paid)
        }
    };

    if current != expected || side != required_side {
        return Err(AppError::Forbidden(TRANSITION_DENIED.to_string()));
    }
    Ok(target)
}

fn patch_for(input: &TransitionInput) -> PaymentPatch {
    match input {
        TransitionInput::Issue {
            amount,
            discount,
            expiry_date,
        }
        | TransitionInput::MarkPaid {
            amount,
            discount,
            expiry_date,
        }
        | TransitionInput::Cancel {
            amount,
            discount,
            expiry_date,
        } => PaymentPatch {
            amount: Some(*amount),
            discount: *discount,
            expiry_date: Some(*expiry_date),
            ..PaymentPatch::default()
        },
        TransitionInput::Accept { note } | TransitionInput::SendBack { note } => PaymentPatch {
            note: note.clone(),
            ..PaymentPatch::default()
        },
        TransitionInput::ReportPayment { payment_date }
        | TransitionInput::ConfirmPayment { payment_date } => PaymentPatch {
            payment_date: Some(*payment_date),
            ..PaymentPatch::default()
        },
    }
}

/// Apply one lifecycle transition on behalf of `acting_user`.
///
/// The status the action starts from is asserted against the stored row
/// and re-asserted inside the UPDATE's WHERE clause, so a concurrent
/// writer can never be silently overwritten. A conditional write that
/// matches nothing while the row still reads as the asserted status is a
/// pure write race and is retried a bounded number of times.
pub async fn apply_transition(
    state: &AppState,
    payment_id: Uuid,
    acting_user: Uuid,
    input: &TransitionInput,
) -> Result<TransitionOutcome, AppError> {
    input.validate()?;
    let pool = db_pool(state)?;

    let payment = payments::get_payment(pool, payment_id).await?;
    let rental = rentals::get_rental(pool, payment.rental_id).await?;
    let side = tenancy::resolve_side(pool, &rental, acting_user).await?;

    let current = payment
        .status()
        .ok_or_else(|| AppError::Internal("Payment row has an unknown status.".to_string()))?;
    let target = authorize(current, side, input)?;
    let patch = patch_for(input);

    for attempt in 0..state.config.transition_max_retries {
        let updated = payments::update_payment_status(
            pool,
            payment_id,
            current.as_str(),
            target.as_str(),
            &patch,
            Some(acting_user),
        )
        .await?;

        if let Some(updated) = updated {
            events::record_payment_event(
                state,
                updated.rental_id,
                updated.id,
                current,
                target,
                Some(side),
            )
            .await;

            return Ok(TransitionOutcome {
                payment: updated,
                old_status: current,
                new_status: target,
                acting_side: side,
            });
        }

        // Nothing matched: either the row moved on (stale assertion) or we
        // lost a pure write race. Re-read to tell the two apart.
        let fresh = payments::get_payment(pool, payment_id).await?;
        if fresh.status() != Some(current) {
            return Err(AppError::Forbidden(TRANSITION_DENIED.to_string()));
        }
        tracing::warn!(
            payment_id = %payment_id,
            attempt,
            "Conditional payment update raced, retrying"
        );
    }

    Err(AppError::Conflict(
        "Payment is being updated concurrently, retry later.".to_string(),
    ))
}

/// Side resolution plus the not-a-party guard, for read endpoints.
pub async fn resolve_payment_party(
    state: &AppState,
    payment: &RentalPayment,
    headers: &axum::http::HeaderMap,
) -> Result<(Uuid, Side), AppError> {
    let pool = db_pool(state)?;
    let user_id = auth::require_user_id(state, headers)?;
    let rental = rentals::get_rental(pool, payment.rental_id).await?;
    let side = tenancy::assert_rental_party(pool, &rental, user_id).await?;
    Ok((user_id, side))
}

fn db_pool(state: &AppState) -> Result<&sqlx::PgPool, AppError> {
    state
        .db_pool
        .as_ref()
        .ok_or_else(|| AppError::Dependency("Database is not configured.".to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn sample_inputs() -> Vec<(&'static str, TransitionInput)> {
        let expiry = NaiveDate::from_ymd_opt(2021, 2, 5).unwrap();
        let paid_on = NaiveDate::from_ymd_opt(2021, 2, 3).unwrap();
        vec![
            (
                "issue",
                TransitionInput::Issue {
                    amount: 1000.0,
                    discount: None,
                    expiry_date: expiry,
                },
            ),
            (
                "mark_paid",
                TransitionInput::MarkPaid {
                    amount: 1000.0,
                    discount: None,
                    expiry_date: expiry,
                },
            ),
            (
                "cancel",
                TransitionInput::Cancel {
                    amount: 1000.0,
                    discount: None,
                    expiry_date: expiry,
                },
            ),
            ("accept", TransitionInput::Accept { note: None }),
            ("send_back", TransitionInput::SendBack { note: None }),
            (
                "report_payment",
                TransitionInput::ReportPayment {
                    payment_date: paid_on,
                },
            ),
            (
                "confirm_payment",
                TransitionInput::ConfirmPayment {
                    payment_date: paid_on,
                },
            ),
        ]
    }

    /// The only (status, side, action) triples that may succeed, and where
    /// they land.
    fn allowed() -> Vec<(PaymentStatus, Side, &'static str, PaymentStatus)> {
        vec![
            (PaymentStatus::Plan, Side::Landlord, "issue", PaymentStatus::Issued),
            (PaymentStatus::Plan, Side::Landlord, "mark_paid", PaymentStatus::Paid),
            (PaymentStatus::Plan, Side::Landlord, "cancel", PaymentStatus::Cancelled),
            (PaymentStatus::Issued, Side::Tenant, "accept", PaymentStatus::Pending),
            (PaymentStatus::Issued, Side::Tenant, "send_back", PaymentStatus::Plan),
            (
                PaymentStatus::Pending,
                Side::Tenant,
                "report_payment",
                PaymentStatus::Request2Pay,
            ),
            (
                PaymentStatus::Request2Pay,
                Side::Landlord,
                "confirm_payment",
                PaymentStatus::Paid,
            ),
        ]
    }

    #[test]
    fn transition_table_is_exhaustive() {
        let allowed = allowed();
        let sides = [Side::Landlord, Side::Tenant, Side::Unrelated];

        for status in PaymentStatus::ALL {
            for side in sides {
                for (name, input) in sample_inputs() {
                    let result = authorize(status, side, &input);
                    let expectation = allowed
                        .iter()
                        .find(|(s, p, n, _)| *s == status && *p == side && *n == name);

                    match expectation {
                        Some((_, _, _, target)) => {
                            assert_eq!(
                                result.as_ref().ok(),
                                Some(target),
                                "{name} from {status:?} as {side:?} should reach {target:?}"
                            );
                        }
                        None => {
                            assert!(
                                result.is_err(),
                                "{name} from {status:?} as {side:?} must be denied"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn fine_states_have_no_direct_actions() {
        for status in [PaymentStatus::PartiallyPaid, PaymentStatus::PayFine] {
            for side in [Side::Landlord, Side::Tenant] {
                for (_, input) in sample_inputs() {
                    assert!(authorize(status, side, &input).is_err());
                }
            }
        }
    }

    #[test]
    fn unrelated_users_are_always_denied() {
        for status in PaymentStatus::ALL {
            for (_, input) in sample_inputs() {
                assert!(authorize(status, Side::Unrelated, &input).is_err());
            }
        }
    }

    #[test]
    fn patch_carries_exactly_the_action_fields() {
        let expiry = NaiveDate::from_ymd_opt(2021, 2, 5).unwrap();
        let patch = patch_for(&TransitionInput::Issue {
            amount: 1200.0,
            discount: Some(100.0),
            expiry_date: expiry,
        });
        assert_eq!(patch.amount, Some(1200.0));
        assert_eq!(patch.discount, Some(100.0));
        assert_eq!(patch.expiry_date, Some(expiry));
        assert!(patch.payment_date.is_none());
        assert!(patch.note.is_none());
        assert!(patch.fine.is_none());

        let patch = patch_for(&TransitionInput::ReportPayment {
            payment_date: expiry,
        });
        assert!(patch.amount.is_none());
        assert_eq!(patch.payment_date, Some(expiry));
    }
}

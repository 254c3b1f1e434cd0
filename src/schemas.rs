use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

pub fn clamp_limit_in_range(limit: Option<i64>, min: i64, max: i64) -> i64 {
    limit.unwrap_or(max).clamp(min, max)
}

#[derive(Debug, Deserialize)]
pub struct RentalPath {
    pub rental_id: uuid::Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PaymentPath {
    pub payment_id: uuid::Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PreRentalPath {
    pub pre_rental_id: uuid::Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PaymentsQuery {
    pub status: Option<String>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
    pub limit: Option<i64>,
}

/// One variant per allowed lifecycle action. The variant fixes both the
/// payment status the caller believes the row is in and the fields the
/// action carries, so an unsupported (status, payload) pairing cannot be
/// expressed at all.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TransitionInput {
    /// Landlord issues a planned payment to the tenant.
    Issue {
        amount: f64,
        discount: Option<f64>,
        expiry_date: NaiveDate,
    },
    /// Landlord settles a planned payment directly (e.g. paid in cash up
    /// front, never issued).
    MarkPaid {
        amount: f64,
        discount: Option<f64>,
        expiry_date: NaiveDate,
    },
    /// Landlord cancels a planned payment.
    Cancel {
        amount: f64,
        discount: Option<f64>,
        expiry_date: NaiveDate,
    },
    /// Tenant accepts an issued payment and commits to paying it.
    Accept { note: Option<String> },
    /// Tenant sends an issued payment back to the landlord's drafting
    /// board.
    SendBack { note: Option<String> },
    /// Tenant reports having paid; lands in the landlord's confirmation
    /// queue.
    ReportPayment { payment_date: NaiveDate },
    /// Landlord confirms the reported payment arrived.
    ConfirmPayment { payment_date: NaiveDate },
}

impl TransitionInput {
    /// Boundary validation: amounts must be non-negative before anything
    /// reaches the lifecycle engine.
    pub fn validate(&self) -> Result<(), AppError> {
        let (amount, discount) = match self {
            Self::Issue {
                amount, discount, ..
            }
            | Self::MarkPaid {
                amount, discount, ..
            }
            | Self::Cancel {
                amount, discount, ..
            } => (Some(*amount), *discount),
            Self::Accept { .. }
            | Self::SendBack { .. }
            | Self::ReportPayment { .. }
            | Self::ConfirmPayment { .. } => (None, None),
        };

        if amount.is_some_and(|value| !value.is_finite() || value < 0.0) {
            return Err(AppError::UnprocessableEntity(
                "amount must be a non-negative number.".to_string(),
            ));
        }
        if discount.is_some_and(|value| !value.is_finite() || value < 0.0) {
            return Err(AppError::UnprocessableEntity(
                "discount must be a non-negative number.".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyAccessInput {
    #[validate(length(min = 1, max = 4096))]
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_actions_deserialize_by_tag() {
        let issue: TransitionInput = serde_json::from_str(
            r#"{"action":"issue","amount":1000.0,"discount":50.0,"expiry_date":"2021-02-05"}"#,
        )
        .expect("issue payload");
        assert!(matches!(issue, TransitionInput::Issue { .. }));

        let report: TransitionInput =
            serde_json::from_str(r#"{"action":"report_payment","payment_date":"2021-02-03"}"#)
                .expect("report payload");
        assert!(matches!(report, TransitionInput::ReportPayment { .. }));

        let unknown = serde_json::from_str::<TransitionInput>(r#"{"action":"teleport"}"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn rejects_negative_amounts_at_the_boundary() {
        let input = TransitionInput::Issue {
            amount: -1.0,
            discount: None,
            expiry_date: NaiveDate::from_ymd_opt(2021, 2, 5).unwrap(),
        };
        assert!(input.validate().is_err());

        let input = TransitionInput::Issue {
            amount: 100.0,
            discount: Some(-5.0),
            expiry_date: NaiveDate::from_ymd_opt(2021, 2, 5).unwrap(),
        };
        assert!(input.validate().is_err());

        let input = TransitionInput::ConfirmPayment {
            payment_date: NaiveDate::from_ymd_opt(2021, 2, 5).unwrap(),
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn clamps_limits() {
        assert_eq!(clamp_limit_in_range(None, 1, 500), 500);
        assert_eq!(clamp_limit_in_range(Some(0), 1, 500), 1);
        assert_eq!(clamp_limit_in_range(Some(10_000), 1, 500), 500);
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle states of a payment row. `Plan` is the only creation state;
/// `Paid` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[serde(rename = "PLAN")]
    Plan,
    #[serde(rename = "ISSUED")]
    Issued,
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "REQUEST2PAY")]
    Request2Pay,
    #[serde(rename = "PARTIALLYPAID")]
    PartiallyPaid,
    #[serde(rename = "PAYFINE")]
    PayFine,
    #[serde(rename = "PAID")]
    Paid,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 8] = [
        Self::Plan,
        Self::Issued,
        Self::Pending,
        Self::Request2Pay,
        Self::PartiallyPaid,
        Self::PayFine,
        Self::Paid,
        Self::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "PLAN",
            Self::Issued => "ISSUED",
            Self::Pending => "PENDING",
            Self::Request2Pay => "REQUEST2PAY",
            Self::PartiallyPaid => "PARTIALLYPAID",
            Self::PayFine => "PAYFINE",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "PLAN" => Some(Self::Plan),
            "ISSUED" => Some(Self::Issued),
            "PENDING" => Some(Self::Pending),
            "REQUEST2PAY" => Some(Self::Request2Pay),
            "PARTIALLYPAID" => Some(Self::PartiallyPaid),
            "PAYFINE" => Some(Self::PayFine),
            "PAID" => Some(Self::Paid),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// What a payment row charges for. The category participates in the
/// idempotency code, so the spelling here is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentCategory {
    #[serde(rename = "RENTAL")]
    Rental,
    #[serde(rename = "DEPOSIT")]
    Deposit,
    #[serde(rename = "ELECTRICITY")]
    Electricity,
    #[serde(rename = "WATER")]
    Water,
    #[serde(rename = "SERVICES")]
    Services,
}

impl PaymentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rental => "RENTAL",
            Self::Deposit => "DEPOSIT",
            Self::Electricity => "ELECTRICITY",
            Self::Water => "WATER",
            Self::Services => "SERVICES",
        }
    }
}

/// How late payments are penalized once the grace period has run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyScheme {
    None,
    Fixed,
    Percent,
}

impl PenaltyScheme {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "NONE" => Some(Self::None),
            "FIXED" => Some(Self::Fixed),
            "PERCENT" => Some(Self::Percent),
            _ => None,
        }
    }
}

/// Which contractual party an acting user represents for a rental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Landlord,
    Tenant,
    Unrelated,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landlord => "landlord",
            Self::Tenant => "tenant",
            Self::Unrelated => "unrelated",
        }
    }
}

/// Rental contract, read-only from the payment engine's point of view.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Rental {
    pub id: Uuid,
    pub property_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub tenant_user_id: Uuid,
    pub start_date: NaiveDate,
    pub move_in_date: Option<NaiveDate>,
    pub rental_period_months: i32,
    pub rental_price: f64,
    pub payment_basis_months: i32,
    pub grace_period_days: i32,
    pub penalty_scheme: String,
    pub penalty_amount: f64,
    pub deposit_amount: Option<f64>,
    pub electricity_fee: Option<f64>,
    pub water_fee: Option<f64>,
    pub service_fee: Option<f64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rental {
    pub fn is_in_progress(&self) -> bool {
        self.status.trim() == "INPROGRESS"
    }
}

/// A single recurring (or one-off) financial obligation on a rental.
/// Mutated exclusively through lifecycle transitions and the fine sweep.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RentalPayment {
    pub id: Uuid,
    pub code: String,
    pub rental_id: Uuid,
    pub category: String,
    pub amount: f64,
    pub discount: Option<f64>,
    pub fine: Option<f64>,
    pub paid: f64,
    pub status: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub payment_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RentalPayment {
    pub fn status(&self) -> Option<PaymentStatus> {
        PaymentStatus::parse(&self.status)
    }

    /// Outstanding balance, always derived, never stored.
    pub fn must_pay(&self) -> f64 {
        self.amount - self.paid - self.discount.unwrap_or(0.0)
    }
}

/// Draft rental record a prospective tenant can be granted scoped access
/// to via an access key, before they have an account.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PreRental {
    pub id: Uuid,
    pub created_by_user_id: Uuid,
    pub property_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub tenant_full_name: String,
    pub tenant_email: String,
    pub tenant_phone: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in PaymentStatus::ALL {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::parse("REQUEST2PAY"), Some(PaymentStatus::Request2Pay));
        assert_eq!(PaymentStatus::parse("bogus"), None);
    }

    #[test]
    fn must_pay_is_derived_from_amount_paid_and_discount() {
        let payment = RentalPayment {
            id: Uuid::nil(),
            code: "x".to_string(),
            rental_id: Uuid::nil(),
            category: "RENTAL".to_string(),
            amount: 1000.0,
            discount: Some(100.0),
            fine: None,
            paid: 250.0,
            status: "PENDING".to_string(),
            start_date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2021, 2, 1).unwrap(),
            expiry_date: None,
            payment_date: None,
            note: None,
            updated_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!((payment.must_pay() - 650.0).abs() < f64::EPSILON);
    }

    #[test]
    fn penalty_scheme_parses_known_values_only() {
        assert_eq!(PenaltyScheme::parse("FIXED"), Some(PenaltyScheme::Fixed));
        assert_eq!(PenaltyScheme::parse(" PERCENT "), Some(PenaltyScheme::Percent));
        assert_eq!(PenaltyScheme::parse("fixed"), None);
    }
}

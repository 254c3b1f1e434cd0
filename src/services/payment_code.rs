use chrono::{Datelike, NaiveDate};

use crate::model::PaymentCategory;

/// Deterministic, human-auditable code for a payment row:
/// `{rental_id}_{CATEGORY}_{MM}{YYYY}{MM}{YYYY}` over the billing period's
/// start and end month. The same inputs always produce the same string, so
/// the code doubles as the planner's idempotency key.
pub fn payment_code<I: std::fmt::Display>(
    rental_id: I,
    category: PaymentCategory,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> String {
    format!(
        "{}_{}_{:02}{:04}{:02}{:04}",
        rental_id,
        category.as_str(),
        start_date.month(),
        start_date.year(),
        end_date.month(),
        end_date.year(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn formats_period_months_zero_padded() {
        let code = payment_code(
            1,
            PaymentCategory::Rental,
            date(2021, 1, 1),
            date(2021, 2, 1),
        );
        assert_eq!(code, "1_RENTAL_012021022021");
    }

    #[test]
    fn recomputation_is_idempotent() {
        let id = Uuid::new_v4();
        let first = payment_code(id, PaymentCategory::Water, date(2021, 10, 1), date(2021, 12, 1));
        let second = payment_code(id, PaymentCategory::Water, date(2021, 10, 1), date(2021, 12, 1));
        assert_eq!(first, second);
        assert!(first.ends_with("_WATER_102021122021"));
    }

    #[test]
    fn category_and_period_change_the_code() {
        let id = 123_456_789_u64;
        let rental = payment_code(id, PaymentCategory::Rental, date(2021, 1, 1), date(2021, 2, 1));
        let deposit = payment_code(id, PaymentCategory::Deposit, date(2021, 1, 1), date(2021, 2, 1));
        let shifted = payment_code(id, PaymentCategory::Rental, date(2021, 2, 1), date(2021, 3, 1));
        assert_eq!(rental, "123456789_RENTAL_012021022021");
        assert_ne!(rental, deposit);
        assert_ne!(rental, shifted);
    }
}

use chrono::{Months, NaiveDate};

/// Charge for a billing period that may be shorter than one full payment
/// basis cycle.
///
/// A period shorter than `start + basis_months` (calendar-month addition)
/// is billed pro rata over elapsed days against a uniform 30-day month;
/// a full-or-longer period is billed the nominal price, never scaled up.
/// The flat 30-day denominator is intentional and kept for compatibility
/// with the stored billing history.
pub fn cycle_price(
    start_date: NaiveDate,
    end_date: NaiveDate,
    basis_months: u32,
    nominal_price: f64,
) -> f64 {
    let duration_days = (end_date - start_date).num_days();
    let full_cycle_end = start_date.checked_add_months(Months::new(basis_months));

    match full_cycle_end {
        Some(full_end) if full_end <= end_date => nominal_price,
        // Either the period is short of a full cycle, or the month addition
        // overflowed (in which case the period is certainly shorter).
        _ => nominal_price * duration_days as f64 / (basis_months as f64 * 30.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn exact_cycle_is_billed_in_full() {
        let price = cycle_price(date(2021, 1, 1), date(2021, 2, 1), 1, 1000.0);
        assert!((price - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_cycle_is_prorated_by_days_over_thirty() {
        // 17 days of a 1-month basis: 1000 * 17 / 30.
        let price = cycle_price(date(2021, 1, 15), date(2021, 2, 1), 1, 1000.0);
        let delta = 2.0 * (1000.0 / 30.0);
        assert!((price - 500.0).abs() < delta, "price was {price}");
        assert!((price - 1000.0 * 17.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn longer_than_basis_is_never_scaled_up() {
        let price = cycle_price(date(2021, 1, 1), date(2021, 3, 15), 1, 1000.0);
        assert!((price - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn short_february_still_counts_as_a_full_cycle() {
        // Feb 1 → Mar 1 is 28 days but exactly one calendar month.
        let price = cycle_price(date(2021, 2, 1), date(2021, 3, 1), 1, 900.0);
        assert!((price - 900.0).abs() < f64::EPSILON);
    }

    #[test]
    fn multi_month_basis_uses_thirty_day_months() {
        // One month of a 3-month basis: 3000 * 31 / 90.
        let price = cycle_price(date(2021, 1, 1), date(2021, 2, 1), 3, 3000.0);
        assert!((price - 3000.0 * 31.0 / 90.0).abs() < 1e-9);
    }
}

//! Post-extraction validation: manifest compliance, duplicate detection,
//! and the sanity checks on quantities and dates.

pub mod duplicate;
pub mod manifest;

pub use duplicate::{check_duplicate, DUPLICATE_WINDOW_DAYS};
pub use manifest::{check_manifest, check_manifest_reuse};

use chrono::{Duration, NaiveDate, Utc};

use crate::model::{Problem, ReviewReason};

/// Quantities above this are assumed to be misreads (a single ticket for
/// ten thousand tons does not happen on a truck scale).
pub const MAX_PLAUSIBLE_QUANTITY: f64 = 10_000.0;

/// How far back a ticket date may plausibly lie.
pub const MAX_DATE_AGE_YEARS: i64 = 5;

/// Flags quantities outside the plausible range. `None` quantities are
/// not flagged here; whether quantity is required is a template concern.
pub fn check_quantity(quantity: Option<f64>) -> Option<Problem> {
    let q = quantity?;
    if q <= 0.0 || q > MAX_PLAUSIBLE_QUANTITY {
        Some(Problem::new(
            ReviewReason::UnusualQuantity,
            format!("quantity {} outside plausible range (0, {}]", q, MAX_PLAUSIBLE_QUANTITY),
        ))
    } else {
        None
    }
}

/// Flags dates far in the past or in the future. Tomorrow is allowed to
/// absorb timezone skew between the scanner and this host.
pub fn check_date_range(date: NaiveDate) -> Option<Problem> {
    let today = Utc::now().date_naive();
    let oldest = today - Duration::days(MAX_DATE_AGE_YEARS * 365);
    let newest = today + Duration::days(1);
    if date < oldest || date > newest {
        Some(Problem::new(
            ReviewReason::OutOfRangeDate,
            format!("ticket date {} outside [{}, {}]", date, oldest, newest),
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_bounds() {
        assert!(check_quantity(None).is_none());
        assert!(check_quantity(Some(12.5)).is_none());
        assert!(check_quantity(Some(10_000.0)).is_none());
        assert!(check_quantity(Some(0.0)).is_some());
        assert!(check_quantity(Some(-3.0)).is_some());
        assert!(check_quantity(Some(10_000.1)).is_some());
    }

    #[test]
    fn test_date_range() {
        let today = Utc::now().date_naive();
        assert!(check_date_range(today).is_none());
        assert!(check_date_range(today + Duration::days(1)).is_none());
        assert!(check_date_range(today + Duration::days(2)).is_some());
        assert!(check_date_range(today - Duration::days(30)).is_none());
        assert!(check_date_range(today - Duration::days(6 * 365)).is_some());
    }
}

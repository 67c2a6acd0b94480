use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::types::PaymentStatus;

/// derived fields of an installment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derived {
    pub residual: Money,
    pub is_paid: bool,
    pub payment_status: PaymentStatus,
}

/// residual and time-bucket derivation
///
/// Everything here is a pure function of the face amount, the paid amount,
/// the due date and the supplied "today".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusDeriver {
    tolerance: Money,
    upcoming_window_days: u32,
}

impl StatusDeriver {
    pub fn new(tolerance: Money, upcoming_window_days: u32) -> Self {
        Self {
            tolerance,
            upcoming_window_days,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.tolerance, config.status.upcoming_window_days)
    }

    /// `amount - amount_paid`, clamped to exactly zero inside the tolerance
    pub fn residual(&self, amount: Money, amount_paid: Money) -> (Money, bool) {
        let residual = amount - amount_paid;
        if residual.is_negligible(self.tolerance) {
            (Money::ZERO, true)
        } else {
            (residual, false)
        }
    }

    pub fn status(&self, is_paid: bool, date_due: NaiveDate, today: NaiveDate) -> PaymentStatus {
        if is_paid {
            return PaymentStatus::Paid;
        }
        if date_due < today {
            return PaymentStatus::Overdue;
        }

        let horizon = today
            .checked_add_days(Days::new(u64::from(self.upcoming_window_days)))
            .unwrap_or(NaiveDate::MAX);
        if date_due <= horizon {
            PaymentStatus::Upcoming
        } else {
            PaymentStatus::Future
        }
    }

    pub fn derive(
        &self,
        amount: Money,
        amount_paid: Money,
        date_due: NaiveDate,
        today: NaiveDate,
    ) -> Derived {
        let (residual, is_paid) = self.residual(amount, amount_paid);
        Derived {
            residual,
            is_paid,
            payment_status: self.status(is_paid, date_due, today),
        }
    }
}

impl Default for StatusDeriver {
    fn default() -> Self {
        Self::from_config(&EngineConfig::baseline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_residual_clamp() {
        let deriver = StatusDeriver::default();

        let (residual, paid) = deriver.residual(Money::from_major(9_000), Money::from_major(5_000));
        assert_eq!(residual, Money::from_major(4_000));
        assert!(!paid);

        let (residual, paid) = deriver.residual(
            Money::from_str_exact("9000.004").unwrap(),
            Money::from_major(9_000),
        );
        assert_eq!(residual, Money::ZERO);
        assert!(paid);

        // slightly overpaid within tolerance is still settled
        let (residual, paid) = deriver.residual(
            Money::from_major(9_000),
            Money::from_str_exact("9000.009").unwrap(),
        );
        assert_eq!(residual, Money::ZERO);
        assert!(paid);
    }

    #[rstest]
    #[case(30, PaymentStatus::Upcoming)]
    #[case(31, PaymentStatus::Future)]
    #[case(0, PaymentStatus::Upcoming)]
    #[case(-1, PaymentStatus::Overdue)]
    fn test_status_boundaries(#[case] offset_days: i64, #[case] expected: PaymentStatus) {
        let deriver = StatusDeriver::default();
        let today = date(2025, 3, 15);
        let due = today + chrono::Duration::days(offset_days);

        assert_eq!(deriver.status(false, due, today), expected);
    }

    #[rstest]
    #[case(-400)]
    #[case(0)]
    #[case(400)]
    fn test_paid_ignores_dates(#[case] offset_days: i64) {
        let deriver = StatusDeriver::default();
        let today = date(2025, 3, 15);
        let due = today + chrono::Duration::days(offset_days);

        let derived = deriver.derive(Money::from_major(5_000), Money::from_major(5_000), due, today);
        assert_eq!(derived.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let deriver = StatusDeriver::default();
        let today = date(2025, 6, 1);
        let due = date(2025, 6, 20);

        let first = deriver.derive(Money::from_major(9_000), Money::from_major(1_000), due, today);
        let second = deriver.derive(Money::from_major(9_000), Money::from_major(1_000), due, today);
        assert_eq!(first, second);
        assert_eq!(first.payment_status, PaymentStatus::Upcoming);
    }

    #[test]
    fn test_custom_window() {
        let deriver = StatusDeriver::new(Money::TOLERANCE, 7);
        let today = date(2025, 1, 1);

        assert_eq!(deriver.status(false, date(2025, 1, 8), today), PaymentStatus::Upcoming);
        assert_eq!(deriver.status(false, date(2025, 1, 9), today), PaymentStatus::Future);
    }
}

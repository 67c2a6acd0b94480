use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

/// working precision of amounts
const MONEY_DP: u32 = 8;
/// precision of stored exchange rates
const EXCHANGE_DP: u32 = 6;

/// Amount in a contract or payment currency.
///
/// Plan amounts such as `remainder / count` are carried at 8 decimal
/// places; comparisons against the plan total use [`Money::TOLERANCE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    pub const ONE: Money = Money(Decimal::ONE);
    /// one hundredth of a currency unit
    pub const TOLERANCE: Money = Money(Decimal::from_parts(1, 0, 0, false, 2));

    pub fn from_decimal(d: Decimal) -> Self {
        Money(d.round_dp(MONEY_DP))
    }

    pub fn from_str_exact(s: &str) -> Result<Self, rust_decimal::Error> {
        Decimal::from_str(s).map(Money::from_decimal)
    }

    /// whole units (lira, dollars, euros)
    pub fn from_major(amount: i64) -> Self {
        Money(Decimal::from(amount))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn round_dp(&self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    pub fn min(self, other: Self) -> Self {
        std::cmp::min(self, other)
    }

    pub fn max(self, other: Self) -> Self {
        std::cmp::max(self, other)
    }

    /// `|self| < tolerance`; such residuals count as settled
    pub fn is_negligible(&self, tolerance: Money) -> bool {
        self.abs() < tolerance
    }

    /// `|self - other| <= tolerance`
    pub fn approx_eq(&self, other: Money, tolerance: Money) -> bool {
        (*self - other).abs() <= tolerance
    }

    /// share of a price, e.g. a 10% down payment
    pub fn portion(&self, rate: Rate) -> Self {
        *self * rate.as_decimal()
    }

    /// value in the target currency of `rate`
    pub fn convert(&self, rate: ExchangeRate) -> Self {
        *self * rate.as_decimal()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::from_str_exact(s)
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money::from_decimal(d)
    }
}

// every arithmetic result is brought back to working precision
macro_rules! money_arith {
    ($($trait:ident::$method:ident, $assign:ident::$assign_method:ident => $op:tt;)*) => {
        $(
            impl $trait for Money {
                type Output = Money;

                fn $method(self, other: Money) -> Money {
                    Money::from_decimal(self.0 $op other.0)
                }
            }

            impl $assign for Money {
                fn $assign_method(&mut self, other: Money) {
                    *self = *self $op other;
                }
            }
        )*
    };
}

money_arith! {
    Add::add, AddAssign::add_assign => +;
    Sub::sub, SubAssign::sub_assign => -;
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, factor: Decimal) -> Money {
        Money::from_decimal(self.0 * factor)
    }
}

impl Div<Decimal> for Money {
    type Output = Money;

    fn div(self, divisor: Decimal) -> Money {
        Money::from_decimal(self.0 / divisor)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

/// fraction of a price, 0.10 for 10%
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);
    pub const ONE: Rate = Rate(Decimal::ONE);

    pub fn from_decimal(d: Decimal) -> Self {
        Rate(d)
    }

    /// 10 for 10%
    pub fn from_percentage(p: Decimal) -> Self {
        Rate(p / Decimal::ONE_HUNDRED)
    }

    /// share of `whole` represented by `part`; zero when `whole` is zero
    pub fn of(part: Money, whole: Money) -> Self {
        if whole.is_zero() {
            Rate::ZERO
        } else {
            Rate(part.as_decimal() / whole.as_decimal())
        }
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn as_percentage(&self) -> Decimal {
        self.0 * Decimal::ONE_HUNDRED
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().normalize())
    }
}

/// units of the target currency bought by one unit of the source currency
///
/// `covered = amount * rate`. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExchangeRate(Decimal);

impl ExchangeRate {
    pub const PARITY: ExchangeRate = ExchangeRate(Decimal::ONE);

    /// `None` unless the rate survives rounding as a positive number
    pub fn new(d: Decimal) -> Option<Self> {
        let rounded = d.round_dp(EXCHANGE_DP);
        (rounded > Decimal::ZERO).then_some(ExchangeRate(rounded))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// `a -> c` from `a -> b` (self) and `c -> b` (other)
    pub fn cross(&self, other: ExchangeRate) -> Option<Self> {
        ExchangeRate::new(self.0 / other.0)
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_working_precision() {
        let m = Money::from_str_exact("100.123456789").unwrap();
        assert_eq!(m.to_string(), "100.12345679");

        let third = Money::from_major(100) / dec!(3);
        assert_eq!(third.as_decimal().scale(), 8);
    }

    #[test]
    fn test_tolerance_checks() {
        let a = Money::from_str_exact("100.004").unwrap();
        assert!(a.approx_eq(Money::from_major(100), Money::TOLERANCE));
        assert!(!Money::from_str_exact("100.02").unwrap().approx_eq(Money::from_major(100), Money::TOLERANCE));

        assert!(Money::from_str_exact("0.009").unwrap().is_negligible(Money::TOLERANCE));
        assert!(Money::from_str_exact("-0.009").unwrap().is_negligible(Money::TOLERANCE));
        assert!(!Money::from_str_exact("0.01").unwrap().is_negligible(Money::TOLERANCE));
    }

    #[test]
    fn test_portion_and_share() {
        let price = Money::from_major(120_000);
        let ten_percent = Rate::from_percentage(dec!(10));

        assert_eq!(price.portion(ten_percent), Money::from_major(12_000));
        assert_eq!(Rate::of(Money::from_major(12_000), price), ten_percent);
        assert_eq!(Rate::of(Money::from_major(1), Money::ZERO), Rate::ZERO);
        assert_eq!(ten_percent.to_string(), "10%");
    }

    #[test]
    fn test_exchange_rate() {
        assert!(ExchangeRate::new(Decimal::ZERO).is_none());
        assert!(ExchangeRate::new(dec!(-1)).is_none());
        assert!(ExchangeRate::new(dec!(0.0000001)).is_none());

        let usd_try = ExchangeRate::new(dec!(32)).unwrap();
        assert_eq!(Money::from_major(1_500).convert(usd_try), Money::from_major(48_000));

        let eur_try = ExchangeRate::new(dec!(40)).unwrap();
        let usd_eur = usd_try.cross(eur_try).unwrap();
        assert_eq!(usd_eur.as_decimal(), dec!(0.8));
    }

    #[test]
    fn test_assign_ops_and_sum() {
        let mut paid = Money::from_major(5_000);
        paid += Money::from_major(4_000);
        paid -= Money::from_major(1_000);
        assert_eq!(paid, Money::from_major(8_000));
        assert_eq!(-paid, Money::from_major(-8_000));

        let parts = [Money::from_major(1), Money::from_major(2), Money::from_major(3)];
        let total: Money = parts.iter().sum();
        assert_eq!(total, Money::from_major(6));
    }
}

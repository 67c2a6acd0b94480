pub mod feed;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{ExchangeRate, Money};
use crate::errors::{EngineError, Result};
use crate::types::CurrencyCode;

pub use feed::{sheet_url, CentralBankFeed, FeedTransport, RateRow, RateSheet, FEED_QUOTE_CURRENCY};

/// source of conversion rates between two currencies on a given day
pub trait RateSource {
    /// `covered = amount * rate` converts `from` into `to`
    fn rate(&self, from: &CurrencyCode, to: &CurrencyCode, date: NaiveDate) -> Option<ExchangeRate>;
}

/// dated rates against a single base currency
///
/// Each entry says how many units of the base currency one unit of the
/// keyed currency buys. Lookups use the latest entry on or before the
/// requested date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    base: CurrencyCode,
    tracked: BTreeSet<CurrencyCode>,
    rates: BTreeMap<CurrencyCode, BTreeMap<NaiveDate, ExchangeRate>>,
}

impl RateTable {
    pub fn new(base: CurrencyCode) -> Self {
        Self {
            base,
            tracked: BTreeSet::new(),
            rates: BTreeMap::new(),
        }
    }

    pub fn base(&self) -> &CurrencyCode {
        &self.base
    }

    /// mark a currency as active so feed syncs write its rates
    pub fn track(&mut self, code: CurrencyCode) {
        if code != self.base {
            self.tracked.insert(code);
        }
    }

    pub fn is_tracked(&self, code: &CurrencyCode) -> bool {
        self.tracked.contains(code)
    }

    pub fn tracked(&self) -> impl Iterator<Item = &CurrencyCode> {
        self.tracked.iter()
    }

    /// insert or replace the rate for `code` on `date`; returns the replaced rate
    pub fn set_rate(
        &mut self,
        code: CurrencyCode,
        date: NaiveDate,
        rate: ExchangeRate,
    ) -> Option<ExchangeRate> {
        self.tracked.insert(code.clone());
        self.rates.entry(code).or_default().insert(date, rate)
    }

    /// base units per one unit of `code`, effective on `date`
    pub fn rate_to_base(&self, code: &CurrencyCode, date: NaiveDate) -> Option<ExchangeRate> {
        if *code == self.base {
            return Some(ExchangeRate::PARITY);
        }
        self.rates
            .get(code)?
            .range(..=date)
            .next_back()
            .map(|(_, rate)| *rate)
    }

    /// exact entry for `date`, without falling back to earlier days
    pub fn rate_on(&self, code: &CurrencyCode, date: NaiveDate) -> Option<ExchangeRate> {
        self.rates.get(code)?.get(&date).copied()
    }
}

impl RateSource for RateTable {
    fn rate(&self, from: &CurrencyCode, to: &CurrencyCode, date: NaiveDate) -> Option<ExchangeRate> {
        if from == to {
            return Some(ExchangeRate::PARITY);
        }
        let from_base = self.rate_to_base(from, date)?;
        let to_base = self.rate_to_base(to, date)?;
        from_base.cross(to_base)
    }
}

/// outcome of converting a payment into the contract currency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalized {
    pub rate: ExchangeRate,
    pub covered: Money,
}

/// express `amount` in `to` using the rate effective on `date`
pub fn normalize(
    rates: &impl RateSource,
    amount: Money,
    from: &CurrencyCode,
    to: &CurrencyCode,
    date: NaiveDate,
) -> Result<Normalized> {
    let rate = if from == to {
        ExchangeRate::PARITY
    } else {
        rates
            .rate(from, to, date)
            .ok_or_else(|| EngineError::RateUnavailable {
                from: from.clone(),
                to: to.clone(),
                date,
            })?
    };

    Ok(Normalized {
        rate,
        covered: amount.convert(rate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::new(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn table() -> RateTable {
        let mut table = RateTable::new(code("TRY"));
        table.set_rate(code("USD"), date(2025, 1, 5), ExchangeRate::new(dec!(32.0)).unwrap());
        table.set_rate(code("EUR"), date(2025, 1, 5), ExchangeRate::new(dec!(35.2)).unwrap());
        table
    }

    #[test]
    fn test_foreign_payment_into_try() {
        let normalized = normalize(
            &table(),
            Money::from_major(1_500),
            &code("USD"),
            &code("TRY"),
            date(2025, 1, 5),
        )
        .unwrap();

        assert_eq!(normalized.rate.as_decimal(), dec!(32.0));
        assert_eq!(normalized.covered, Money::from_major(48_000));
    }

    #[test]
    fn test_same_currency_is_parity() {
        let empty = RateTable::new(code("TRY"));
        let normalized = normalize(
            &empty,
            Money::from_major(250),
            &code("EUR"),
            &code("EUR"),
            date(2025, 1, 5),
        )
        .unwrap();

        assert_eq!(normalized.rate, ExchangeRate::PARITY);
        assert_eq!(normalized.covered, Money::from_major(250));
    }

    #[test]
    fn test_missing_rate() {
        let result = normalize(
            &table(),
            Money::from_major(10),
            &code("GBP"),
            &code("TRY"),
            date(2025, 1, 5),
        );
        assert!(matches!(result, Err(EngineError::RateUnavailable { .. })));

        // nothing published on or before the date
        let result = normalize(
            &table(),
            Money::from_major(10),
            &code("USD"),
            &code("TRY"),
            date(2025, 1, 4),
        );
        assert!(matches!(result, Err(EngineError::RateUnavailable { .. })));
    }

    #[test]
    fn test_latest_rate_on_or_before() {
        let mut table = table();
        table.set_rate(code("USD"), date(2025, 1, 8), ExchangeRate::new(dec!(32.5)).unwrap());

        // weekend falls back to friday's sheet
        let rate = table.rate(&code("USD"), &code("TRY"), date(2025, 1, 6)).unwrap();
        assert_eq!(rate.as_decimal(), dec!(32.0));

        let rate = table.rate(&code("USD"), &code("TRY"), date(2025, 1, 9)).unwrap();
        assert_eq!(rate.as_decimal(), dec!(32.5));
        assert!(table.rate_on(&code("USD"), date(2025, 1, 6)).is_none());
    }

    #[test]
    fn test_cross_rate_through_base() {
        let mut table = RateTable::new(code("TRY"));
        table.set_rate(code("USD"), date(2025, 1, 5), ExchangeRate::new(dec!(32)).unwrap());
        table.set_rate(code("EUR"), date(2025, 1, 5), ExchangeRate::new(dec!(40)).unwrap());

        let eur_to_usd = table.rate(&code("EUR"), &code("USD"), date(2025, 1, 5)).unwrap();
        assert_eq!(eur_to_usd.as_decimal(), dec!(1.25));

        let try_to_usd = table.rate(&code("TRY"), &code("USD"), date(2025, 1, 5)).unwrap();
        assert_eq!(try_to_usd.as_decimal(), dec!(0.03125));
    }

    #[test]
    fn test_upsert_replaces() {
        let mut table = table();
        let old = table.set_rate(code("USD"), date(2025, 1, 5), ExchangeRate::new(dec!(33)).unwrap());
        assert_eq!(old.map(|r| r.as_decimal()), Some(dec!(32.0)));
        assert!(table.is_tracked(&code("USD")));
    }
}

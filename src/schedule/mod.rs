pub mod generator;
pub mod rebalance;

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{EngineError, Result};
use crate::types::{BalloonTiming, InstallmentKind};

pub use generator::ScheduleGenerator;
pub use rebalance::{Rebalancer, ADJUSTMENT_SEQUENCE};

/// a share of the price expressed either as a percentage or a fixed amount
///
/// Either representation can be read back against a price, which keeps the
/// percentage and the amount consistent when the price changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum PriceShare {
    Percentage(Rate),
    Fixed(Money),
}

impl PriceShare {
    pub const NONE: PriceShare = PriceShare::Fixed(Money::ZERO);

    pub fn amount(&self, price: Money) -> Money {
        match self {
            PriceShare::Percentage(rate) => price.portion(*rate),
            PriceShare::Fixed(amount) => *amount,
        }
    }

    pub fn percentage(&self, price: Money) -> Rate {
        match self {
            PriceShare::Percentage(rate) => *rate,
            PriceShare::Fixed(amount) => Rate::of(*amount, price),
        }
    }

    /// switch to fixed mode, keeping the current value against `price`
    pub fn to_fixed(&self, price: Money) -> PriceShare {
        PriceShare::Fixed(self.amount(price))
    }

    /// switch to percentage mode, keeping the current value against `price`
    pub fn to_percentage(&self, price: Money) -> PriceShare {
        PriceShare::Percentage(self.percentage(price))
    }

    pub fn is_negative(&self) -> bool {
        match self {
            PriceShare::Percentage(rate) => rate.is_negative(),
            PriceShare::Fixed(amount) => amount.is_negative(),
        }
    }
}

/// scheduled installment before it is attached to a contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentSpec {
    pub sequence: u32,
    pub name: String,
    pub kind: InstallmentKind,
    pub date_due: NaiveDate,
    pub amount: Money,
}

/// payment plan inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTerms {
    /// negotiated price before maturity difference and discount
    pub sale_price: Money,
    pub maturity_difference: Money,
    pub discount: Money,
    /// percentage mode is measured against the final price
    pub down_payment: PriceShare,
    pub down_payment_date: NaiveDate,
    /// signed as received from the host; negative counts are rejected
    pub installment_count: i32,
    pub first_installment_date: NaiveDate,
    /// percentage mode is measured against the sale price
    pub balloon: PriceShare,
    pub balloon_timing: BalloonTiming,
}

impl PlanTerms {
    pub fn builder() -> PlanTermsBuilder {
        PlanTermsBuilder::new()
    }

    /// `sale_price + maturity_difference - discount`
    pub fn final_price(&self) -> Money {
        self.sale_price + self.maturity_difference - self.discount
    }

    pub fn down_payment_amount(&self) -> Money {
        self.down_payment.amount(self.final_price())
    }

    pub fn balloon_amount(&self) -> Money {
        self.balloon.amount(self.sale_price)
    }
}

/// builder for plan terms
pub struct PlanTermsBuilder {
    sale_price: Option<Money>,
    maturity_difference: Money,
    discount: Money,
    down_payment: PriceShare,
    down_payment_date: Option<NaiveDate>,
    installment_count: i32,
    first_installment_date: Option<NaiveDate>,
    balloon: PriceShare,
    balloon_timing: BalloonTiming,
}

impl PlanTermsBuilder {
    /// defaults: 10% down payment, 12 monthly installments, no balloon
    pub fn new() -> Self {
        Self {
            sale_price: None,
            maturity_difference: Money::ZERO,
            discount: Money::ZERO,
            down_payment: PriceShare::Percentage(Rate::from_percentage(dec!(10))),
            down_payment_date: None,
            installment_count: 12,
            first_installment_date: None,
            balloon: PriceShare::NONE,
            balloon_timing: BalloonTiming::End,
        }
    }

    pub fn sale_price(mut self, price: Money) -> Self {
        self.sale_price = Some(price);
        self
    }

    pub fn maturity_difference(mut self, amount: Money) -> Self {
        self.maturity_difference = amount;
        self
    }

    pub fn discount(mut self, amount: Money) -> Self {
        self.discount = amount;
        self
    }

    pub fn down_payment_percentage(mut self, percentage: rust_decimal::Decimal) -> Self {
        self.down_payment = PriceShare::Percentage(Rate::from_percentage(percentage));
        self
    }

    pub fn down_payment_amount(mut self, amount: Money) -> Self {
        self.down_payment = PriceShare::Fixed(amount);
        self
    }

    pub fn no_down_payment(mut self) -> Self {
        self.down_payment = PriceShare::NONE;
        self
    }

    pub fn down_payment_date(mut self, date: NaiveDate) -> Self {
        self.down_payment_date = Some(date);
        self
    }

    pub fn installments(mut self, count: i32) -> Self {
        self.installment_count = count;
        self
    }

    pub fn first_installment_date(mut self, date: NaiveDate) -> Self {
        self.first_installment_date = Some(date);
        self
    }

    pub fn balloon_percentage(mut self, percentage: rust_decimal::Decimal) -> Self {
        self.balloon = PriceShare::Percentage(Rate::from_percentage(percentage));
        self
    }

    pub fn balloon_amount(mut self, amount: Money) -> Self {
        self.balloon = PriceShare::Fixed(amount);
        self
    }

    pub fn balloon_timing(mut self, timing: BalloonTiming) -> Self {
        self.balloon_timing = timing;
        self
    }

    /// build with system time for unset dates
    pub fn build(self) -> Result<PlanTerms> {
        let time = SafeTimeProvider::new(hourglass_rs::TimeSource::System);
        self.build_with_time(&time)
    }

    /// unset dates default to the provider's current day
    pub fn build_with_time(self, time_provider: &SafeTimeProvider) -> Result<PlanTerms> {
        let sale_price = self.sale_price.ok_or(EngineError::InvalidPlan {
            message: "sale price required".to_string(),
        })?;

        let today = time_provider.now().date_naive();

        Ok(PlanTerms {
            sale_price,
            maturity_difference: self.maturity_difference,
            discount: self.discount,
            down_payment: self.down_payment,
            down_payment_date: self.down_payment_date.unwrap_or(today),
            installment_count: self.installment_count,
            first_installment_date: self.first_installment_date.unwrap_or(today),
            balloon: self.balloon,
            balloon_timing: self.balloon_timing,
        })
    }
}

impl Default for PlanTermsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

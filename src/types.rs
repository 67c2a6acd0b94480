use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{EngineError, Result};

/// unique identifier for a sale contract
pub type ContractId = Uuid;

/// unique identifier for an installment
pub type InstallmentId = Uuid;

/// unique identifier for a collection event
pub type PaymentId = Uuid;

/// unique identifier for an inventory unit
pub type UnitId = Uuid;

pub type ProjectId = Uuid;

pub type BlockId = Uuid;

/// ISO 4217 alphabetic currency code
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(EngineError::InvalidCurrency { code });
        }
        Ok(CurrencyCode(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        CurrencyCode::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// sale contract lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractState {
    Draft,
    Confirmed,
    Cancelled,
}

/// installment kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentKind {
    DownPayment,
    Installment,
    Balloon,
}

/// time bucket of an installment relative to "today"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// residual is zero within tolerance
    Paid,
    /// unpaid and due before today
    Overdue,
    /// unpaid and due within the lookahead window
    Upcoming,
    /// unpaid and due after the lookahead window
    Future,
}

/// collection event lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Draft,
    Posted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Cash,
    Check,
    PromissoryNote,
}

/// inventory unit lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Available,
    /// reserved for a prospective buyer
    Option,
    Sold,
    Handover,
}

/// where the balloon installment lands in the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalloonTiming {
    End,
    Mid,
}

/// what to do with funds left after every unpaid installment is covered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverpaymentPolicy {
    /// report the leftover as unallocated and drop it
    Discard,
    /// fail the whole allocation
    Reject,
    /// hold the leftover on the contract for the next allocation
    CreditBalance,
}

/// what cancelling a posted payment does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// posted payments cannot be cancelled
    Reject,
    /// undo the payment's allocation trail
    Reverse,
}

/// handling of the `mid` balloon timing, which has no defined placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidBalloonPolicy {
    Reject,
    AliasToEnd,
}

/// which figure of the central-bank sheet feeds the rate table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSide {
    Buying,
    Selling,
}

/// one row of the allocation trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub payment_id: PaymentId,
    pub installment_id: InstallmentId,
    pub amount_applied: Money,
}

macro_rules! display_as_serde_name {
    ($($ty:ty),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    let name = serde_json::to_value(self)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default();
                    f.write_str(&name)
                }
            }
        )*
    };
}

display_as_serde_name!(
    ContractState,
    InstallmentKind,
    PaymentStatus,
    PaymentState,
    PaymentMethod,
    UnitState,
    BalloonTiming,
);

use chrono::NaiveDate;
use thiserror::Error;

use crate::decimal::Money;
use crate::types::{ContractId, CurrencyCode, InstallmentId, PaymentId, UnitId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid payment plan: {message}")]
    InvalidPlan {
        message: String,
    },

    #[error("payment amount must be positive: {amount}")]
    NonPositiveAmount {
        amount: Money,
    },

    #[error("covered amount must be positive after conversion: {covered}")]
    InvalidPayment {
        covered: Money,
    },

    #[error("unsupported operation: {message}")]
    UnsupportedOperation {
        message: String,
    },

    #[error("payment would overpay the plan: outstanding {outstanding}, offered {offered}")]
    Overpayment {
        outstanding: Money,
        offered: Money,
    },

    #[error("no exchange rate available for {from} -> {to} on {date}")]
    RateUnavailable {
        from: CurrencyCode,
        to: CurrencyCode,
        date: NaiveDate,
    },

    #[error("invalid currency code: {code}")]
    InvalidCurrency {
        code: String,
    },

    #[error("invalid state: current {current}, expected {expected}")]
    InvalidState {
        current: String,
        expected: String,
    },

    #[error("contract not found: {id}")]
    ContractNotFound {
        id: ContractId,
    },

    #[error("payment not found: {id}")]
    PaymentNotFound {
        id: PaymentId,
    },

    #[error("installment not found: {id}")]
    InstallmentNotFound {
        id: InstallmentId,
    },

    #[error("unit {given} does not belong to contract (expected {expected})")]
    UnitMismatch {
        expected: UnitId,
        given: UnitId,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("storage error: {message}")]
    Storage {
        message: String,
    },

    #[error("rate feed error: {message}")]
    Feed {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;

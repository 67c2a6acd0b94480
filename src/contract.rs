use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{ExchangeRate, Money};
use crate::errors::{EngineError, Result};
use crate::schedule::InstallmentSpec;
use crate::status::StatusDeriver;
use crate::types::{
    ContractId, ContractState, CurrencyCode, InstallmentId, InstallmentKind, PaymentAllocation,
    PaymentId, PaymentMethod, PaymentState, PaymentStatus, UnitId,
};

/// one scheduled, dated portion of a sale price
///
/// `residual`, `is_paid` and `payment_status` are derived and refreshed on
/// every change to the amount, the paid amount or the due date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub sequence: u32,
    pub name: String,
    pub kind: InstallmentKind,
    date_due: NaiveDate,
    amount: Money,
    amount_paid: Money,
    residual: Money,
    is_paid: bool,
    payment_status: PaymentStatus,
}

impl Installment {
    pub fn new(
        sequence: u32,
        name: impl Into<String>,
        kind: InstallmentKind,
        date_due: NaiveDate,
        amount: Money,
        deriver: &StatusDeriver,
        today: NaiveDate,
    ) -> Self {
        let derived = deriver.derive(amount, Money::ZERO, date_due, today);
        Self {
            id: Uuid::new_v4(),
            sequence,
            name: name.into(),
            kind,
            date_due,
            amount,
            amount_paid: Money::ZERO,
            residual: derived.residual,
            is_paid: derived.is_paid,
            payment_status: derived.payment_status,
        }
    }

    pub fn from_spec(spec: &InstallmentSpec, deriver: &StatusDeriver, today: NaiveDate) -> Self {
        Self::new(
            spec.sequence,
            spec.name.clone(),
            spec.kind,
            spec.date_due,
            spec.amount,
            deriver,
            today,
        )
    }

    pub fn date_due(&self) -> NaiveDate {
        self.date_due
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn amount_paid(&self) -> Money {
        self.amount_paid
    }

    pub fn residual(&self) -> Money {
        self.residual
    }

    pub fn is_paid(&self) -> bool {
        self.is_paid
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    /// allocation ordering: due date, then sequence
    pub fn allocation_key(&self) -> (NaiveDate, u32) {
        (self.date_due, self.sequence)
    }

    /// add to the paid amount (negative to reverse) and re-derive
    pub(crate) fn apply_payment(&mut self, delta: Money, deriver: &StatusDeriver, today: NaiveDate) {
        self.amount_paid += delta;
        self.recompute(deriver, today);
    }

    /// manual correction of the face amount
    pub fn set_amount(&mut self, amount: Money, deriver: &StatusDeriver, today: NaiveDate) {
        self.amount = amount;
        self.recompute(deriver, today);
    }

    /// manual correction of the paid amount
    pub fn set_amount_paid(&mut self, amount_paid: Money, deriver: &StatusDeriver, today: NaiveDate) {
        self.amount_paid = amount_paid;
        self.recompute(deriver, today);
    }

    pub fn reschedule(&mut self, date_due: NaiveDate, deriver: &StatusDeriver, today: NaiveDate) {
        self.date_due = date_due;
        self.recompute(deriver, today);
    }

    /// re-derive residual and status; returns the status transition if any
    pub fn recompute(
        &mut self,
        deriver: &StatusDeriver,
        today: NaiveDate,
    ) -> Option<(PaymentStatus, PaymentStatus)> {
        let old_status = self.payment_status;
        let derived = deriver.derive(self.amount, self.amount_paid, self.date_due, today);
        self.residual = derived.residual;
        self.is_paid = derived.is_paid;
        self.payment_status = derived.payment_status;

        (old_status != derived.payment_status).then_some((old_status, derived.payment_status))
    }
}

/// property sale contract owning its payment plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleContract {
    pub id: ContractId,
    pub reference: String,
    pub customer_id: String,
    pub unit_id: UnitId,
    sale_price: Money,
    pub currency: CurrencyCode,
    pub state: ContractState,
    pub date_sale: NaiveDate,
    pub maturity_difference: Money,
    pub discount: Money,
    installments: Vec<Installment>,
    total_paid: Money,
    balance: Money,
    credit_balance: Money,
}

impl SaleContract {
    pub fn new(
        customer_id: String,
        unit_id: UnitId,
        sale_price: Money,
        currency: CurrencyCode,
        date_sale: NaiveDate,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            reference: format!("SC-{}", id.simple().to_string()[..8].to_uppercase()),
            customer_id,
            unit_id,
            sale_price,
            currency,
            state: ContractState::Draft,
            date_sale,
            maturity_difference: Money::ZERO,
            discount: Money::ZERO,
            installments: Vec::new(),
            total_paid: Money::ZERO,
            balance: sale_price,
            credit_balance: Money::ZERO,
        }
    }

    pub fn installments(&self) -> &[Installment] {
        &self.installments
    }

    pub fn installment(&self, id: InstallmentId) -> Result<&Installment> {
        self.installments
            .iter()
            .find(|i| i.id == id)
            .ok_or(EngineError::InstallmentNotFound { id })
    }

    pub(crate) fn installment_mut(&mut self, id: InstallmentId) -> Result<&mut Installment> {
        self.installments
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(EngineError::InstallmentNotFound { id })
    }

    pub(crate) fn installments_mut(&mut self) -> &mut [Installment] {
        &mut self.installments
    }

    pub(crate) fn push_installment(&mut self, installment: Installment) {
        self.installments.push(installment);
        self.recompute_totals();
    }

    pub fn sale_price(&self) -> Money {
        self.sale_price
    }

    /// reprice the contract; the balance follows the new price
    pub fn set_sale_price(&mut self, price: Money) {
        self.sale_price = price;
        self.recompute_totals();
    }

    /// sum of face amounts
    pub fn plan_total(&self) -> Money {
        self.installments.iter().map(Installment::amount).sum()
    }

    pub fn total_paid(&self) -> Money {
        self.total_paid
    }

    /// sale price minus everything paid so far
    pub fn balance(&self) -> Money {
        self.balance
    }

    /// overpaid funds held for the next allocation
    pub fn credit_balance(&self) -> Money {
        self.credit_balance
    }

    pub(crate) fn set_credit_balance(&mut self, amount: Money) {
        self.credit_balance = amount;
    }

    pub fn recompute_totals(&mut self) {
        self.total_paid = self.installments.iter().map(Installment::amount_paid).sum();
        self.balance = self.sale_price - self.total_paid;
    }

    /// positions of unpaid installments in allocation order
    pub fn unpaid_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = self
            .installments
            .iter()
            .enumerate()
            .filter(|(_, i)| !i.is_paid())
            .map(|(idx, _)| idx)
            .collect();
        order.sort_by_key(|&idx| self.installments[idx].allocation_key());
        order
    }

    /// sum of residuals still owed on unpaid installments
    pub fn outstanding(&self) -> Money {
        self.installments
            .iter()
            .filter(|i| !i.is_paid())
            .map(Installment::residual)
            .sum()
    }

    pub fn is_balanced(&self, tolerance: Money) -> bool {
        self.sale_price.approx_eq(self.plan_total(), tolerance)
    }

    pub fn max_sequence(&self) -> Option<u32> {
        self.installments.iter().map(|i| i.sequence).max()
    }

    pub fn latest_due_date(&self) -> Option<NaiveDate> {
        self.installments.iter().map(Installment::date_due).max()
    }

    pub fn can_accept_payment(&self) -> bool {
        !matches!(self.state, ContractState::Cancelled)
    }

    pub fn confirm(&mut self) -> Result<()> {
        if self.state != ContractState::Draft {
            return Err(EngineError::InvalidState {
                current: self.state.to_string(),
                expected: ContractState::Draft.to_string(),
            });
        }
        self.state = ContractState::Confirmed;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        if self.state == ContractState::Cancelled {
            return Err(EngineError::InvalidState {
                current: self.state.to_string(),
                expected: "draft or confirmed".to_string(),
            });
        }
        self.state = ContractState::Cancelled;
        Ok(())
    }
}

/// one collection event against a sale contract
///
/// The exchange rate is fixed when the payment is created so later
/// corrections of the rate table do not move historical allocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub reference: String,
    pub contract_id: ContractId,
    pub customer_id: String,
    pub amount: Money,
    pub currency: CurrencyCode,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    exchange_rate: ExchangeRate,
    covered_amount: Money,
    state: PaymentState,
    allocations: Vec<PaymentAllocation>,
    credit_used: Money,
    credited: Money,
}

impl Payment {
    pub fn new(
        contract_id: ContractId,
        customer_id: String,
        amount: Money,
        currency: CurrencyCode,
        payment_date: NaiveDate,
        method: PaymentMethod,
        exchange_rate: ExchangeRate,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            reference: format!("PAY-{}", id.simple().to_string()[..8].to_uppercase()),
            contract_id,
            customer_id,
            amount,
            currency,
            payment_date,
            method,
            exchange_rate,
            covered_amount: amount.convert(exchange_rate),
            state: PaymentState::Draft,
            allocations: Vec::new(),
            credit_used: Money::ZERO,
            credited: Money::ZERO,
        }
    }

    pub fn exchange_rate(&self) -> ExchangeRate {
        self.exchange_rate
    }

    /// amount expressed in the contract currency
    pub fn covered_amount(&self) -> Money {
        self.covered_amount
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    pub fn allocations(&self) -> &[PaymentAllocation] {
        &self.allocations
    }

    /// contract credit consumed together with this payment
    pub fn credit_used(&self) -> Money {
        self.credit_used
    }

    /// leftover of this payment moved to contract credit
    pub fn credited(&self) -> Money {
        self.credited
    }

    pub(crate) fn mark_posted(
        &mut self,
        allocations: Vec<PaymentAllocation>,
        credit_used: Money,
        credited: Money,
    ) -> Result<()> {
        self.expect_state(PaymentState::Draft)?;
        self.allocations = allocations;
        self.credit_used = credit_used;
        self.credited = credited;
        self.state = PaymentState::Posted;
        Ok(())
    }

    pub(crate) fn mark_cancelled(&mut self) -> Result<()> {
        if self.state == PaymentState::Cancelled {
            return Err(EngineError::InvalidState {
                current: self.state.to_string(),
                expected: "draft or posted".to_string(),
            });
        }
        self.allocations.clear();
        self.credit_used = Money::ZERO;
        self.credited = Money::ZERO;
        self.state = PaymentState::Cancelled;
        Ok(())
    }

    pub(crate) fn expect_state(&self, expected: PaymentState) -> Result<()> {
        if self.state != expected {
            return Err(EngineError::InvalidState {
                current: self.state.to_string(),
                expected: expected.to_string(),
            });
        }
        Ok(())
    }
}

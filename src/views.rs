//! serializable snapshots for reporting
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::contract::{Installment, Payment};
use crate::decimal::{ExchangeRate, Money};
use crate::schedule::{InstallmentSpec, PlanTerms};
use crate::store::ContractRecord;
use crate::types::{
    ContractId, ContractState, CurrencyCode, InstallmentId, InstallmentKind, PaymentAllocation,
    PaymentId, PaymentMethod, PaymentState, PaymentStatus, UnitId,
};

/// serializable view of a contract and its plan
#[derive(Debug, Serialize, Deserialize)]
pub struct ContractView {
    pub id: ContractId,
    pub reference: String,
    pub customer_id: String,
    pub unit_id: UnitId,
    pub state: ContractState,
    pub currency: CurrencyCode,
    pub date_sale: NaiveDate,
    pub pricing: PricingView,
    pub collections: CollectionView,
    pub installments: Vec<InstallmentView>,
    pub payments: Vec<PaymentView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PricingView {
    pub sale_price: Money,
    pub maturity_difference: Money,
    pub discount: Money,
    pub plan_total: Money,
    pub balanced: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionView {
    pub total_paid: Money,
    pub balance: Money,
    pub outstanding: Money,
    pub credit_balance: Money,
    pub overdue_amount: Money,
    pub overdue_count: usize,
    pub next_due_date: Option<NaiveDate>,
    pub next_due_amount: Option<Money>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstallmentView {
    pub id: InstallmentId,
    pub sequence: u32,
    pub name: String,
    pub kind: InstallmentKind,
    pub date_due: NaiveDate,
    pub amount: Money,
    pub amount_paid: Money,
    pub residual: Money,
    pub is_paid: bool,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentView {
    pub id: PaymentId,
    pub reference: String,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub amount: Money,
    pub currency: CurrencyCode,
    pub exchange_rate: ExchangeRate,
    pub covered_amount: Money,
    pub state: PaymentState,
    pub allocations: Vec<PaymentAllocation>,
}

impl ContractView {
    pub fn from_record(record: &ContractRecord, tolerance: Money) -> Self {
        let contract = &record.contract;

        let mut installments: Vec<&Installment> = contract.installments().iter().collect();
        installments.sort_by_key(|i| i.allocation_key());

        let overdue: Vec<&&Installment> = installments
            .iter()
            .filter(|i| i.payment_status() == PaymentStatus::Overdue)
            .collect();
        let next_due = installments.iter().find(|i| !i.is_paid());

        ContractView {
            id: contract.id,
            reference: contract.reference.clone(),
            customer_id: contract.customer_id.clone(),
            unit_id: contract.unit_id,
            state: contract.state,
            currency: contract.currency.clone(),
            date_sale: contract.date_sale,
            pricing: PricingView {
                sale_price: contract.sale_price(),
                maturity_difference: contract.maturity_difference,
                discount: contract.discount,
                plan_total: contract.plan_total(),
                balanced: contract.is_balanced(tolerance),
            },
            collections: CollectionView {
                total_paid: contract.total_paid(),
                balance: contract.balance(),
                outstanding: contract.outstanding(),
                credit_balance: contract.credit_balance(),
                overdue_amount: overdue.iter().map(|i| i.residual()).sum(),
                overdue_count: overdue.len(),
                next_due_date: next_due.map(|i| i.date_due()),
                next_due_amount: next_due.map(|i| i.residual()),
            },
            installments: installments.into_iter().map(InstallmentView::from_installment).collect(),
            payments: record.payments.iter().map(PaymentView::from_payment).collect(),
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl InstallmentView {
    pub fn from_installment(installment: &Installment) -> Self {
        InstallmentView {
            id: installment.id,
            sequence: installment.sequence,
            name: installment.name.clone(),
            kind: installment.kind,
            date_due: installment.date_due(),
            amount: installment.amount(),
            amount_paid: installment.amount_paid(),
            residual: installment.residual(),
            is_paid: installment.is_paid(),
            payment_status: installment.payment_status(),
        }
    }
}

impl PaymentView {
    pub fn from_payment(payment: &Payment) -> Self {
        PaymentView {
            id: payment.id,
            reference: payment.reference.clone(),
            payment_date: payment.payment_date,
            method: payment.method,
            amount: payment.amount,
            currency: payment.currency.clone(),
            exchange_rate: payment.exchange_rate(),
            covered_amount: payment.covered_amount(),
            state: payment.state(),
            allocations: payment.allocations().to_vec(),
        }
    }
}

/// preview of a generated plan before a contract exists
#[derive(Debug, Serialize, Deserialize)]
pub struct PlanSummary {
    pub final_price: Money,
    pub down_payment: Money,
    pub balloon: Money,
    pub installment_count: usize,
    pub regular_amount: Option<Money>,
    pub first_due: Option<NaiveDate>,
    pub last_due: Option<NaiveDate>,
    pub total: Money,
    pub entries: Vec<InstallmentSpec>,
}

impl PlanSummary {
    pub fn new(terms: &PlanTerms, plan: &[InstallmentSpec]) -> Self {
        let regular: Vec<&InstallmentSpec> = plan
            .iter()
            .filter(|s| s.kind == InstallmentKind::Installment)
            .collect();

        PlanSummary {
            final_price: terms.final_price(),
            down_payment: terms.down_payment_amount(),
            balloon: terms.balloon_amount(),
            installment_count: regular.len(),
            regular_amount: regular.first().map(|s| s.amount),
            first_due: plan.iter().map(|s| s.date_due).min(),
            last_due: plan.iter().map(|s| s.date_due).max(),
            total: plan.iter().map(|s| s.amount).sum(),
            entries: plan.to_vec(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

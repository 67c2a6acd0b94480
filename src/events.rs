use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{ExchangeRate, Money};
use crate::types::{
    ContractId, CurrencyCode, InstallmentId, PaymentId, PaymentStatus, UnitId, UnitState,
};

/// all events that can be emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // contract lifecycle events
    ContractCreated {
        contract_id: ContractId,
        unit_id: UnitId,
        sale_price: Money,
        currency: CurrencyCode,
        timestamp: DateTime<Utc>,
    },
    PlanGenerated {
        contract_id: ContractId,
        installment_count: usize,
        total: Money,
        timestamp: DateTime<Utc>,
    },
    ContractConfirmed {
        contract_id: ContractId,
        timestamp: DateTime<Utc>,
    },
    ContractCancelled {
        contract_id: ContractId,
        timestamp: DateTime<Utc>,
    },
    UnitStateChanged {
        unit_id: UnitId,
        old_state: UnitState,
        new_state: UnitState,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentRegistered {
        contract_id: ContractId,
        payment_id: PaymentId,
        amount: Money,
        currency: CurrencyCode,
        exchange_rate: ExchangeRate,
        covered_amount: Money,
        timestamp: DateTime<Utc>,
    },
    InstallmentSettled {
        contract_id: ContractId,
        installment_id: InstallmentId,
        amount_applied: Money,
        timestamp: DateTime<Utc>,
    },
    InstallmentPartiallyPaid {
        contract_id: ContractId,
        installment_id: InstallmentId,
        amount_applied: Money,
        residual: Money,
        timestamp: DateTime<Utc>,
    },
    PaymentPosted {
        contract_id: ContractId,
        payment_id: PaymentId,
        allocated: Money,
        unallocated: Money,
        timestamp: DateTime<Utc>,
    },
    PaymentCancelled {
        contract_id: ContractId,
        payment_id: PaymentId,
        reversed: Money,
        timestamp: DateTime<Utc>,
    },
    OverpaymentDiscarded {
        contract_id: ContractId,
        payment_id: Option<PaymentId>,
        amount: Money,
        timestamp: DateTime<Utc>,
    },
    CreditBalanceChanged {
        contract_id: ContractId,
        old_balance: Money,
        new_balance: Money,
        timestamp: DateTime<Utc>,
    },

    // plan maintenance events
    PlanRebalanced {
        contract_id: ContractId,
        installment_id: InstallmentId,
        adjustment: Money,
        due_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    InstallmentCorrected {
        contract_id: ContractId,
        installment_id: InstallmentId,
        old_amount_paid: Money,
        new_amount_paid: Money,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        contract_id: ContractId,
        installment_id: InstallmentId,
        old_status: PaymentStatus,
        new_status: PaymentStatus,
        timestamp: DateTime<Utc>,
    },

    // rate events
    RatesSynced {
        rate_date: NaiveDate,
        currencies: Vec<CurrencyCode>,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

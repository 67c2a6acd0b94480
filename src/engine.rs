use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::allocation::{AllocationEngine, AllocationResult};
use crate::config::EngineConfig;
use crate::contract::{Installment, Payment, SaleContract};
use crate::currency::{normalize, RateSource};
use crate::decimal::{ExchangeRate, Money};
use crate::errors::{EngineError, Result};
use crate::events::{Event, EventStore};
use crate::inventory::{Unit, UnitMetrics};
use crate::schedule::{PlanTerms, Rebalancer, ScheduleGenerator};
use crate::status::StatusDeriver;
use crate::store::{ContractRecord, ContractStore};
use crate::types::{
    CancellationPolicy, ContractId, ContractState, CurrencyCode, InstallmentId, PaymentId,
    PaymentMethod, PaymentState, PaymentStatus, UnitState,
};
use crate::views::ContractView;

/// request to open a sale contract on a unit
#[derive(Debug, Clone, PartialEq)]
pub struct ContractRequest {
    pub customer_id: String,
    pub terms: PlanTerms,
    /// defaults to the current day
    pub date_sale: Option<NaiveDate>,
}

/// request to register an incoming payment
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub contract_id: ContractId,
    pub amount: Money,
    pub currency: CurrencyCode,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    /// manual rate; looked up from the rate source when absent
    pub exchange_rate: Option<ExchangeRate>,
}

impl PaymentRequest {
    pub fn new(contract_id: ContractId, amount: Money, currency: CurrencyCode, payment_date: NaiveDate) -> Self {
        Self {
            contract_id,
            amount,
            currency,
            payment_date,
            method: PaymentMethod::BankTransfer,
            exchange_rate: None,
        }
    }

    pub fn method(mut self, method: PaymentMethod) -> Self {
        self.method = method;
        self
    }

    pub fn exchange_rate(mut self, rate: ExchangeRate) -> Self {
        self.exchange_rate = Some(rate);
        self
    }
}

/// manual edit of an installment; unset fields stay as they are
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallmentCorrection {
    pub amount: Option<Money>,
    pub amount_paid: Option<Money>,
    pub date_due: Option<NaiveDate>,
}

/// status change seen by a sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub contract_id: ContractId,
    pub installment_id: InstallmentId,
    pub old_status: PaymentStatus,
    pub new_status: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub date: NaiveDate,
    pub contracts: usize,
    pub installments: usize,
    pub transitions: Vec<StatusTransition>,
}

/// sales and collections engine
///
/// Every mutating operation runs inside a single store transaction, so a
/// failure leaves the stored contract as it was. Events produced by a
/// failed operation are dropped with it.
pub struct SalesEngine<S: ContractStore, R: RateSource> {
    pub config: EngineConfig,
    pub events: EventStore,
    store: S,
    rates: R,
    generator: ScheduleGenerator,
    allocator: AllocationEngine,
    rebalancer: Rebalancer,
    deriver: StatusDeriver,
}

impl<S: ContractStore, R: RateSource> SalesEngine<S, R> {
    pub fn new(config: EngineConfig, store: S, rates: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            generator: ScheduleGenerator::from_config(&config),
            allocator: AllocationEngine::from_config(&config),
            rebalancer: Rebalancer::new(config.tolerance),
            deriver: StatusDeriver::from_config(&config),
            config,
            events: EventStore::new(),
            store,
            rates,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn rates(&self) -> &R {
        &self.rates
    }

    /// for feeding rate syncs into the engine's source
    pub fn rates_mut(&mut self) -> &mut R {
        &mut self.rates
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }

    /// draft a contract on `unit` with a generated payment plan
    ///
    /// The contract's sale price is the final price of the terms. The unit
    /// is not touched until the contract is confirmed.
    pub fn create_contract(
        &mut self,
        unit: &Unit,
        request: ContractRequest,
        time_provider: &SafeTimeProvider,
    ) -> Result<ContractId> {
        if !unit.is_sellable() {
            return Err(EngineError::InvalidState {
                current: unit.state().to_string(),
                expected: "available or option".to_string(),
            });
        }

        let plan = self.generator.generate(&request.terms)?;
        let today = time_provider.now().date_naive();

        let mut contract = SaleContract::new(
            request.customer_id,
            unit.id,
            request.terms.final_price(),
            unit.currency.clone(),
            request.date_sale.unwrap_or(today),
        );
        contract.maturity_difference = request.terms.maturity_difference;
        contract.discount = request.terms.discount;
        for spec in &plan {
            contract.push_installment(Installment::from_spec(spec, &self.deriver, today));
        }

        let contract_id = contract.id;
        let event_created = Event::ContractCreated {
            contract_id,
            unit_id: unit.id,
            sale_price: contract.sale_price(),
            currency: contract.currency.clone(),
            timestamp: time_provider.now(),
        };
        let event_plan = Event::PlanGenerated {
            contract_id,
            installment_count: plan.len(),
            total: contract.plan_total(),
            timestamp: time_provider.now(),
        };

        info!(
            "created contract {} for unit {} at {} {}",
            contract.reference, unit.name, contract.sale_price(), contract.currency
        );
        self.store.insert(ContractRecord::new(contract))?;

        self.events.emit(event_created);
        self.events.emit(event_plan);
        Ok(contract_id)
    }

    /// confirm a draft contract and mark its unit sold
    pub fn confirm_contract(
        &mut self,
        contract_id: ContractId,
        unit: &mut Unit,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        let mut pending = EventStore::new();

        self.store.transaction(contract_id, |record| {
            let contract = &mut record.contract;
            if contract.unit_id != unit.id {
                return Err(EngineError::UnitMismatch {
                    expected: contract.unit_id,
                    given: unit.id,
                });
            }

            contract.confirm()?;
            let old_state = unit.mark_sold()?;

            pending.emit(Event::ContractConfirmed {
                contract_id,
                timestamp: time_provider.now(),
            });
            pending.emit(Event::UnitStateChanged {
                unit_id: unit.id,
                old_state,
                new_state: UnitState::Sold,
                timestamp: time_provider.now(),
            });
            info!("confirmed contract {}", contract.reference);
            Ok(())
        })?;

        self.events.extend(pending.take_events());
        Ok(())
    }

    /// cancel a contract; a sold unit goes back on the market
    pub fn cancel_contract(
        &mut self,
        contract_id: ContractId,
        unit: &mut Unit,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        let mut pending = EventStore::new();

        self.store.transaction(contract_id, |record| {
            let contract = &mut record.contract;
            if contract.unit_id != unit.id {
                return Err(EngineError::UnitMismatch {
                    expected: contract.unit_id,
                    given: unit.id,
                });
            }

            let was_confirmed = contract.state == ContractState::Confirmed;
            contract.cancel()?;
            pending.emit(Event::ContractCancelled {
                contract_id,
                timestamp: time_provider.now(),
            });

            if was_confirmed && unit.state() == UnitState::Sold {
                let old_state = unit.release()?;
                pending.emit(Event::UnitStateChanged {
                    unit_id: unit.id,
                    old_state,
                    new_state: UnitState::Available,
                    timestamp: time_provider.now(),
                });
            }

            info!("cancelled contract {}", contract.reference);
            Ok(())
        })?;

        self.events.extend(pending.take_events());
        Ok(())
    }

    /// record a payment in draft state with its exchange rate fixed
    pub fn register_payment(
        &mut self,
        request: PaymentRequest,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentId> {
        if !request.amount.is_positive() {
            return Err(EngineError::NonPositiveAmount {
                amount: request.amount,
            });
        }

        let mut pending = EventStore::new();
        let rates = &self.rates;

        let payment_id = self.store.transaction(request.contract_id, |record| {
            let contract = &record.contract;
            if !contract.can_accept_payment() {
                return Err(EngineError::InvalidState {
                    current: contract.state.to_string(),
                    expected: "draft or confirmed".to_string(),
                });
            }

            let rate = match request.exchange_rate {
                _ if request.currency == contract.currency => {
                    if let Some(manual) = request.exchange_rate.filter(|r| *r != ExchangeRate::PARITY) {
                        warn!(
                            "ignoring manual rate {} on {} payment to contract {}",
                            manual, request.currency, contract.reference
                        );
                    }
                    ExchangeRate::PARITY
                }
                Some(rate) => rate,
                None => {
                    normalize(
                        rates,
                        request.amount,
                        &request.currency,
                        &contract.currency,
                        request.payment_date,
                    )?
                    .rate
                }
            };

            let payment = Payment::new(
                contract.id,
                contract.customer_id.clone(),
                request.amount,
                request.currency.clone(),
                request.payment_date,
                request.method,
                rate,
            );

            pending.emit(Event::PaymentRegistered {
                contract_id: contract.id,
                payment_id: payment.id,
                amount: payment.amount,
                currency: payment.currency.clone(),
                exchange_rate: rate,
                covered_amount: payment.covered_amount(),
                timestamp: time_provider.now(),
            });

            let payment_id = payment.id;
            record.payments.push(payment);
            Ok(payment_id)
        })?;

        self.events.extend(pending.take_events());
        Ok(payment_id)
    }

    /// allocate a draft payment and mark it posted
    pub fn post_payment(
        &mut self,
        payment_id: PaymentId,
        time_provider: &SafeTimeProvider,
    ) -> Result<AllocationResult> {
        let contract_id = self.store.contract_for_payment(payment_id)?;
        let mut pending = EventStore::new();
        let allocator = &self.allocator;

        let result = self.store.transaction(contract_id, |record| {
            let payment = record.payment(payment_id)?;
            payment.expect_state(PaymentState::Draft)?;
            if !payment.amount.is_positive() {
                return Err(EngineError::NonPositiveAmount {
                    amount: payment.amount,
                });
            }
            if !record.contract.can_accept_payment() {
                return Err(EngineError::InvalidState {
                    current: record.contract.state.to_string(),
                    expected: "draft or confirmed".to_string(),
                });
            }

            let covered = payment.covered_amount();
            let result = allocator.allocate(
                &mut record.contract,
                Some(payment_id),
                covered,
                time_provider,
                &mut pending,
            )?;

            let payment = record.payment_mut(payment_id)?;
            payment.mark_posted(result.trail(payment_id), result.credit_used, result.credited)?;

            pending.emit(Event::PaymentPosted {
                contract_id,
                payment_id,
                allocated: result.allocated,
                unallocated: result.unallocated,
                timestamp: time_provider.now(),
            });
            info!(
                "posted payment {}: {} allocated, {} unallocated",
                payment.reference, result.allocated, result.unallocated
            );
            Ok(result)
        })?;

        self.events.extend(pending.take_events());
        Ok(result)
    }

    /// cancel a payment
    ///
    /// Draft payments are simply cancelled. Posted payments are undone only
    /// under the reversing cancellation policy. Returns the amount taken
    /// back from installments.
    pub fn cancel_payment(
        &mut self,
        payment_id: PaymentId,
        time_provider: &SafeTimeProvider,
    ) -> Result<Money> {
        let contract_id = self.store.contract_for_payment(payment_id)?;
        let policy = self.config.allocation.cancellation_policy;
        let mut pending = EventStore::new();
        let allocator = &self.allocator;

        let reversed = self.store.transaction(contract_id, |record| {
            let payment = record.payment(payment_id)?.clone();

            let reversed = match (payment.state(), policy) {
                (PaymentState::Posted, CancellationPolicy::Reject) => {
                    return Err(EngineError::UnsupportedOperation {
                        message: format!(
                            "posted payment {} cannot be cancelled",
                            payment.reference
                        ),
                    });
                }
                (PaymentState::Posted, CancellationPolicy::Reverse) => {
                    allocator.reverse(&mut record.contract, &payment, time_provider, &mut pending)?
                }
                _ => Money::ZERO,
            };

            record.payment_mut(payment_id)?.mark_cancelled()?;
            pending.emit(Event::PaymentCancelled {
                contract_id,
                payment_id,
                reversed,
                timestamp: time_provider.now(),
            });
            Ok(reversed)
        })?;

        self.events.extend(pending.take_events());
        Ok(reversed)
    }

    /// allocate a covered amount directly, without a payment record
    pub fn allocate(
        &mut self,
        contract_id: ContractId,
        covered: Money,
        time_provider: &SafeTimeProvider,
    ) -> Result<AllocationResult> {
        let mut pending = EventStore::new();
        let allocator = &self.allocator;

        let result = self.store.transaction(contract_id, |record| {
            if !record.contract.can_accept_payment() {
                return Err(EngineError::InvalidState {
                    current: record.contract.state.to_string(),
                    expected: "draft or confirmed".to_string(),
                });
            }
            allocator.allocate(&mut record.contract, None, covered, time_provider, &mut pending)
        })?;

        self.events.extend(pending.take_events());
        Ok(result)
    }

    /// append a balancing entry when the plan total drifted from the price
    pub fn rebalance(
        &mut self,
        contract_id: ContractId,
        time_provider: &SafeTimeProvider,
    ) -> Result<Option<InstallmentId>> {
        let today = time_provider.now().date_naive();
        let mut pending = EventStore::new();
        let rebalancer = &self.rebalancer;
        let deriver = &self.deriver;

        let added = self.store.transaction(contract_id, |record| {
            let contract = &mut record.contract;
            let Some(id) = rebalancer.rebalance(contract, deriver, today) else {
                return Ok(None);
            };

            let entry = contract.installment(id)?;
            pending.emit(Event::PlanRebalanced {
                contract_id,
                installment_id: id,
                adjustment: entry.amount(),
                due_date: entry.date_due(),
                timestamp: time_provider.now(),
            });
            Ok(Some(id))
        })?;

        self.events.extend(pending.take_events());
        Ok(added)
    }

    /// manual correction of one installment
    pub fn correct_installment(
        &mut self,
        contract_id: ContractId,
        installment_id: InstallmentId,
        correction: InstallmentCorrection,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        let today = time_provider.now().date_naive();
        let mut pending = EventStore::new();
        let deriver = &self.deriver;

        self.store.transaction(contract_id, |record| {
            let contract = &mut record.contract;
            let installment = contract.installment_mut(installment_id)?;
            let old_amount_paid = installment.amount_paid();

            if let Some(amount) = correction.amount {
                installment.set_amount(amount, deriver, today);
            }
            if let Some(date_due) = correction.date_due {
                installment.reschedule(date_due, deriver, today);
            }
            if let Some(amount_paid) = correction.amount_paid {
                installment.set_amount_paid(amount_paid, deriver, today);
            }
            let new_amount_paid = installment.amount_paid();
            contract.recompute_totals();

            warn!(
                "manual correction on contract {} installment {}",
                contract.reference, installment_id
            );
            pending.emit(Event::InstallmentCorrected {
                contract_id,
                installment_id,
                old_amount_paid,
                new_amount_paid,
                timestamp: time_provider.now(),
            });
            Ok(())
        })?;

        self.events.extend(pending.take_events());
        Ok(())
    }

    /// re-derive every installment for the provider's current day
    pub fn refresh_statuses(&mut self, time_provider: &SafeTimeProvider) -> Result<SweepReport> {
        let today = time_provider.now().date_naive();
        let deriver = &self.deriver;
        let mut report = SweepReport {
            date: today,
            contracts: 0,
            installments: 0,
            transitions: Vec::new(),
        };

        for contract_id in self.store.ids() {
            let transitions = self.store.transaction(contract_id, |record| {
                let mut transitions = Vec::new();
                for installment in record.contract.installments_mut() {
                    if let Some((old_status, new_status)) = installment.recompute(deriver, today) {
                        transitions.push(StatusTransition {
                            contract_id,
                            installment_id: installment.id,
                            old_status,
                            new_status,
                        });
                    }
                }
                Ok((record.contract.installments().len(), transitions))
            })?;

            report.contracts += 1;
            report.installments += transitions.0;
            report.transitions.extend(transitions.1);
        }

        for transition in &report.transitions {
            self.events.emit(Event::StatusChanged {
                contract_id: transition.contract_id,
                installment_id: transition.installment_id,
                old_status: transition.old_status,
                new_status: transition.new_status,
                timestamp: time_provider.now(),
            });
        }

        info!(
            "status sweep for {}: {} contracts, {} transitions",
            today,
            report.contracts,
            report.transitions.len()
        );
        Ok(report)
    }

    pub fn contract(&self, contract_id: ContractId) -> Result<SaleContract> {
        Ok(self.store.load(contract_id)?.contract)
    }

    pub fn payment(&self, payment_id: PaymentId) -> Result<Payment> {
        let contract_id = self.store.contract_for_payment(payment_id)?;
        let record = self.store.load(contract_id)?;
        record.payment(payment_id).cloned()
    }

    pub fn payments(&self, contract_id: ContractId) -> Result<Vec<Payment>> {
        Ok(self.store.load(contract_id)?.payments)
    }

    pub fn view(&self, contract_id: ContractId) -> Result<ContractView> {
        let record = self.store.load(contract_id)?;
        Ok(ContractView::from_record(&record, self.config.tolerance))
    }

    /// sale figures for `unit` from its confirmed contract, if any
    pub fn unit_metrics(&self, unit: &Unit) -> Result<UnitMetrics> {
        let mut contracts = Vec::new();
        for id in self.store.ids() {
            let record = self.store.load(id)?;
            if record.contract.unit_id == unit.id {
                contracts.push(record.contract);
            }
        }
        Ok(UnitMetrics::for_unit(unit, &contracts))
    }
}

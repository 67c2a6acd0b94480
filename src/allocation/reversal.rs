use hourglass_rs::SafeTimeProvider;
use tracing::info;

use crate::contract::{Payment, SaleContract};
use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::events::{Event, EventStore};
use crate::types::PaymentState;

use super::AllocationEngine;

impl AllocationEngine {
    /// undo a posted payment's allocation trail on its contract
    ///
    /// Returns the total removed from installments. The payment itself is
    /// left untouched; the caller marks it cancelled once this succeeds.
    pub fn reverse(
        &self,
        contract: &mut SaleContract,
        payment: &Payment,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<Money> {
        payment.expect_state(PaymentState::Posted)?;

        // credit this payment left behind must still be on the contract
        let old_credit = contract.credit_balance();
        if payment.credited() > old_credit {
            return Err(EngineError::InvalidState {
                current: format!("credit balance {}", old_credit),
                expected: format!("at least {} of unconsumed credit", payment.credited()),
            });
        }

        for row in payment.allocations() {
            contract.installment(row.installment_id)?;
        }

        let today = time_provider.now().date_naive();
        let mut reversed = Money::ZERO;
        for row in payment.allocations() {
            let installment = contract.installment_mut(row.installment_id)?;
            installment.apply_payment(-row.amount_applied, &self.deriver, today);
            reversed += row.amount_applied;
        }
        contract.recompute_totals();

        let new_credit = old_credit - payment.credited() + payment.credit_used();
        if new_credit != old_credit {
            contract.set_credit_balance(new_credit);
            events.emit(Event::CreditBalanceChanged {
                contract_id: contract.id,
                old_balance: old_credit,
                new_balance: new_credit,
                timestamp: time_provider.now(),
            });
        }

        info!(
            "reversed payment {} on contract {}: {} restored across {} installments",
            payment.reference,
            contract.reference,
            reversed,
            payment.allocations().len()
        );

        Ok(reversed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Installment;
    use crate::decimal::ExchangeRate;
    use crate::status::StatusDeriver;
    use crate::types::{CurrencyCode, InstallmentKind, OverpaymentPolicy, PaymentMethod};
    use chrono::{NaiveDate, TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> (SaleContract, SafeTimeProvider) {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap()));
        let deriver = StatusDeriver::default();
        let today = time.now().date_naive();
        let mut contract = SaleContract::new(
            "CUST-7".to_string(),
            Uuid::new_v4(),
            Money::from_major(2_000),
            CurrencyCode::new("TRY").unwrap(),
            today,
        );
        for (seq, due) in [(1, date(2025, 1, 1)), (2, date(2025, 2, 1))] {
            contract.push_installment(Installment::new(
                seq,
                format!("Installment {}/2", seq),
                InstallmentKind::Installment,
                due,
                Money::from_major(1_000),
                &deriver,
                today,
            ));
        }
        (contract, time)
    }

    fn post(
        engine: &AllocationEngine,
        contract: &mut SaleContract,
        amount: i64,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Payment {
        let mut payment = Payment::new(
            contract.id,
            contract.customer_id.clone(),
            Money::from_major(amount),
            contract.currency.clone(),
            date(2025, 1, 10),
            PaymentMethod::Cash,
            ExchangeRate::PARITY,
        );
        let result = engine
            .allocate(contract, Some(payment.id), payment.covered_amount(), time, events)
            .unwrap();
        payment
            .mark_posted(result.trail(payment.id), result.credit_used, result.credited)
            .unwrap();
        payment
    }

    #[test]
    fn test_reverse_restores_installments() {
        let (mut contract, time) = setup();
        let mut events = EventStore::new();
        let engine = AllocationEngine::default();
        let before = contract.clone();

        let payment = post(&engine, &mut contract, 1_500, &time, &mut events);
        assert_eq!(contract.total_paid(), Money::from_major(1_500));

        let reversed = engine.reverse(&mut contract, &payment, &time, &mut events).unwrap();
        assert_eq!(reversed, Money::from_major(1_500));
        assert_eq!(contract, before);
    }

    #[test]
    fn test_reverse_returns_credit() {
        let (mut contract, time) = setup();
        let mut events = EventStore::new();
        let engine = AllocationEngine::new(
            OverpaymentPolicy::CreditBalance,
            StatusDeriver::default(),
            Money::TOLERANCE,
        );

        let payment = post(&engine, &mut contract, 2_300, &time, &mut events);
        assert_eq!(contract.credit_balance(), Money::from_major(300));

        engine.reverse(&mut contract, &payment, &time, &mut events).unwrap();
        assert_eq!(contract.credit_balance(), Money::ZERO);
        assert_eq!(contract.total_paid(), Money::ZERO);
    }

    #[test]
    fn test_reverse_rejects_consumed_credit() {
        let (mut contract, time) = setup();
        let mut events = EventStore::new();
        let engine = AllocationEngine::new(
            OverpaymentPolicy::CreditBalance,
            StatusDeriver::default(),
            Money::TOLERANCE,
        );

        let first = post(&engine, &mut contract, 2_300, &time, &mut events);
        contract.push_installment(Installment::new(
            3,
            "Installment 3/3",
            InstallmentKind::Installment,
            date(2025, 3, 1),
            Money::from_major(1_000),
            &StatusDeriver::default(),
            date(2025, 1, 10),
        ));
        post(&engine, &mut contract, 100, &time, &mut events);
        assert_eq!(contract.credit_balance(), Money::ZERO);

        let snapshot = contract.clone();
        let result = engine.reverse(&mut contract, &first, &time, &mut events);
        assert!(matches!(result, Err(EngineError::InvalidState { .. })));
        assert_eq!(contract, snapshot);
    }

    #[test]
    fn test_reverse_requires_posted() {
        let (mut contract, time) = setup();
        let mut events = EventStore::new();
        let payment = Payment::new(
            contract.id,
            contract.customer_id.clone(),
            Money::from_major(10),
            contract.currency.clone(),
            date(2025, 1, 10),
            PaymentMethod::Cash,
            ExchangeRate::PARITY,
        );

        let result = AllocationEngine::default().reverse(&mut contract, &payment, &time, &mut events);
        assert!(matches!(result, Err(EngineError::InvalidState { .. })));
    }
}

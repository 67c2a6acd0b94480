pub mod reversal;

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::contract::SaleContract;
use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::events::{Event, EventStore};
use crate::status::StatusDeriver;
use crate::types::{ContractId, InstallmentId, OverpaymentPolicy, PaymentAllocation, PaymentId};

/// effect of an allocation on a single installment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub installment_id: InstallmentId,
    pub sequence: u32,
    pub date_due: NaiveDate,
    pub amount_applied: Money,
    pub residual_after: Money,
    pub settled: bool,
}

/// allocation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub contract_id: ContractId,
    pub payment_id: Option<PaymentId>,
    /// covered amount offered by the payment
    pub covered: Money,
    /// contract credit consumed ahead of the covered amount
    pub credit_used: Money,
    pub allocated: Money,
    /// leftover dropped under the discard policy
    pub unallocated: Money,
    /// leftover moved to the contract credit balance
    pub credited: Money,
    pub lines: Vec<AllocationLine>,
}

impl AllocationResult {
    /// allocation trail rows for the given payment
    pub fn trail(&self, payment_id: PaymentId) -> Vec<PaymentAllocation> {
        self.lines
            .iter()
            .map(|line| PaymentAllocation {
                payment_id,
                installment_id: line.installment_id,
                amount_applied: line.amount_applied,
            })
            .collect()
    }

    pub fn settled_count(&self) -> usize {
        self.lines.iter().filter(|line| line.settled).count()
    }
}

/// FIFO allocation of covered amounts against unpaid installments
pub struct AllocationEngine {
    policy: OverpaymentPolicy,
    deriver: StatusDeriver,
    tolerance: Money,
}

impl AllocationEngine {
    pub fn new(policy: OverpaymentPolicy, deriver: StatusDeriver, tolerance: Money) -> Self {
        Self {
            policy,
            deriver,
            tolerance,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.allocation.overpayment_policy,
            StatusDeriver::from_config(config),
            config.tolerance,
        )
    }

    pub fn policy(&self) -> OverpaymentPolicy {
        self.policy
    }

    /// apply `covered` to the contract's unpaid installments, earliest due first
    ///
    /// Unpaid installments are visited in `(date_due, sequence)` order. Each
    /// is settled while the pool covers its residual; the first one it does
    /// not cover receives what is left and the walk stops. Nothing is
    /// mutated when the overpayment policy rejects the leftover.
    pub fn allocate(
        &self,
        contract: &mut SaleContract,
        payment_id: Option<PaymentId>,
        covered: Money,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<AllocationResult> {
        if !covered.is_positive() {
            return Err(EngineError::InvalidPayment { covered });
        }

        let today = time_provider.now().date_naive();
        let credit_used = contract.credit_balance().max(Money::ZERO);
        let pool = covered + credit_used;

        let (plan, leftover) = plan_walk(contract, pool);
        let leftover = if leftover.is_negligible(self.tolerance) || leftover.is_negative() {
            Money::ZERO
        } else {
            leftover
        };

        if self.policy == OverpaymentPolicy::Reject && leftover.is_positive() {
            return Err(EngineError::Overpayment {
                outstanding: pool - leftover,
                offered: pool,
            });
        }

        let mut lines = Vec::with_capacity(plan.len());
        for (idx, amount) in plan {
            let installment = &mut contract.installments_mut()[idx];
            installment.apply_payment(amount, &self.deriver, today);

            debug!(
                "applied {} to {} (residual now {})",
                amount,
                installment.name,
                installment.residual()
            );

            lines.push(AllocationLine {
                installment_id: installment.id,
                sequence: installment.sequence,
                date_due: installment.date_due(),
                amount_applied: amount,
                residual_after: installment.residual(),
                settled: installment.is_paid(),
            });
        }
        contract.recompute_totals();

        let (unallocated, credited) = match self.policy {
            OverpaymentPolicy::CreditBalance => (Money::ZERO, leftover),
            _ => (leftover, Money::ZERO),
        };

        let old_credit = contract.credit_balance();
        let new_credit = old_credit - credit_used + credited;
        if new_credit != old_credit {
            contract.set_credit_balance(new_credit);
            events.emit(Event::CreditBalanceChanged {
                contract_id: contract.id,
                old_balance: old_credit,
                new_balance: new_credit,
                timestamp: time_provider.now(),
            });
        }

        for line in &lines {
            if line.settled {
                events.emit(Event::InstallmentSettled {
                    contract_id: contract.id,
                    installment_id: line.installment_id,
                    amount_applied: line.amount_applied,
                    timestamp: time_provider.now(),
                });
            } else {
                events.emit(Event::InstallmentPartiallyPaid {
                    contract_id: contract.id,
                    installment_id: line.installment_id,
                    amount_applied: line.amount_applied,
                    residual: line.residual_after,
                    timestamp: time_provider.now(),
                });
            }
        }

        if unallocated.is_positive() {
            warn!(
                "contract {}: {} left after all installments were covered, discarding",
                contract.reference, unallocated
            );
            events.emit(Event::OverpaymentDiscarded {
                contract_id: contract.id,
                payment_id,
                amount: unallocated,
                timestamp: time_provider.now(),
            });
        }

        let allocated: Money = lines.iter().map(|line| line.amount_applied).sum();
        info!(
            "contract {}: allocated {} across {} installments",
            contract.reference,
            allocated,
            lines.len()
        );

        Ok(AllocationResult {
            contract_id: contract.id,
            payment_id,
            covered,
            credit_used,
            allocated,
            unallocated,
            credited,
            lines,
        })
    }
}

impl Default for AllocationEngine {
    fn default() -> Self {
        Self::from_config(&EngineConfig::baseline())
    }
}

/// amounts to apply per installment position, and the pool left over
///
/// Entries with a negative residual (downward balance adjustments) are
/// settled first and their amount joins the pool, as long as the positive
/// residuals still owed can absorb it.
fn plan_walk(contract: &SaleContract, pool: Money) -> (Vec<(usize, Money)>, Money) {
    let installments = contract.installments();
    let (credits, owed): (Vec<usize>, Vec<usize>) = contract
        .unpaid_order()
        .into_iter()
        .partition(|&idx| installments[idx].residual().is_negative());

    let mut remaining = pool;
    let mut plan = Vec::new();

    let mut absorbable: Money = owed.iter().map(|&idx| installments[idx].residual()).sum();
    for idx in credits {
        let released = -installments[idx].residual();
        if released > absorbable {
            continue;
        }
        plan.push((idx, -released));
        remaining += released;
        absorbable -= released;
    }

    for idx in owed {
        if !remaining.is_positive() {
            break;
        }

        let needed = contract.installments()[idx].residual();
        if remaining >= needed {
            plan.push((idx, needed));
            remaining -= needed;
        } else {
            plan.push((idx, remaining));
            remaining = Money::ZERO;
            break;
        }
    }

    (plan, remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Installment;
    use crate::types::{CurrencyCode, InstallmentKind};
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn clock() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap()))
    }

    fn contract(amounts: &[(i64, NaiveDate)]) -> SaleContract {
        let deriver = StatusDeriver::default();
        let total: i64 = amounts.iter().map(|(a, _)| a).sum();
        let mut contract = SaleContract::new(
            "CUST-1".to_string(),
            Uuid::new_v4(),
            Money::from_major(total),
            CurrencyCode::new("TRY").unwrap(),
            date(2025, 1, 1),
        );
        for (i, (amount, due)) in amounts.iter().enumerate() {
            contract.push_installment(Installment::new(
                i as u32 + 1,
                format!("Installment {}/{}", i + 1, amounts.len()),
                InstallmentKind::Installment,
                *due,
                Money::from_major(*amount),
                &deriver,
                date(2025, 1, 10),
            ));
        }
        contract
    }

    #[test]
    fn test_partial_then_full() {
        let time = clock();
        let mut events = EventStore::new();
        let engine = AllocationEngine::default();
        let mut contract = contract(&[(9_000, date(2025, 2, 1))]);

        let result = engine
            .allocate(&mut contract, None, Money::from_major(5_000), &time, &mut events)
            .unwrap();
        assert_eq!(result.lines.len(), 1);
        assert!(!result.lines[0].settled);
        assert_eq!(contract.installments()[0].residual(), Money::from_major(4_000));
        assert!(!contract.installments()[0].is_paid());

        engine
            .allocate(&mut contract, None, Money::from_major(4_000), &time, &mut events)
            .unwrap();
        assert!(contract.installments()[0].is_paid());
        assert_eq!(contract.total_paid(), Money::from_major(9_000));
        assert_eq!(contract.balance(), Money::ZERO);
    }

    #[test]
    fn test_fifo_spills_into_next() {
        let time = clock();
        let mut events = EventStore::new();
        let mut contract = contract(&[(5_000, date(2025, 2, 1)), (5_000, date(2025, 1, 1))]);

        let result = AllocationEngine::default()
            .allocate(&mut contract, None, Money::from_major(7_000), &time, &mut events)
            .unwrap();

        // january entry was pushed second but is due first
        let jan = &contract.installments()[1];
        let feb = &contract.installments()[0];
        assert!(jan.is_paid());
        assert_eq!(feb.amount_paid(), Money::from_major(2_000));
        assert_eq!(feb.residual(), Money::from_major(3_000));

        assert_eq!(result.lines[0].installment_id, jan.id);
        assert_eq!(result.allocated, Money::from_major(7_000));
        assert_eq!(result.settled_count(), 1);
    }

    #[test]
    fn test_at_most_one_partial_and_no_skips() {
        let time = clock();
        let mut events = EventStore::new();
        let mut contract = contract(&[
            (1_000, date(2025, 1, 1)),
            (1_000, date(2025, 2, 1)),
            (1_000, date(2025, 3, 1)),
            (1_000, date(2025, 4, 1)),
        ]);

        let result = AllocationEngine::default()
            .allocate(&mut contract, None, Money::from_major(2_500), &time, &mut events)
            .unwrap();

        let partials = result.lines.iter().filter(|l| !l.settled).count();
        assert_eq!(partials, 1);

        let paid: Vec<Money> = contract.installments().iter().map(|i| i.amount_paid()).collect();
        assert_eq!(
            paid,
            vec![
                Money::from_major(1_000),
                Money::from_major(1_000),
                Money::from_major(500),
                Money::ZERO
            ]
        );
    }

    #[test]
    fn test_discard_reports_leftover() {
        let time = clock();
        let mut events = EventStore::new();
        let mut contract = contract(&[(1_000, date(2025, 1, 1))]);

        let result = AllocationEngine::default()
            .allocate(&mut contract, None, Money::from_major(1_500), &time, &mut events)
            .unwrap();

        assert_eq!(result.allocated, Money::from_major(1_000));
        assert_eq!(result.unallocated, Money::from_major(500));
        assert_eq!(contract.credit_balance(), Money::ZERO);
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, Event::OverpaymentDiscarded { amount, .. } if *amount == Money::from_major(500))));
    }

    #[test]
    fn test_reject_leaves_state_untouched() {
        let time = clock();
        let mut events = EventStore::new();
        let mut contract = contract(&[(1_000, date(2025, 1, 1)), (1_000, date(2025, 2, 1))]);
        let before = contract.clone();

        let engine = AllocationEngine::new(
            OverpaymentPolicy::Reject,
            StatusDeriver::default(),
            Money::TOLERANCE,
        );
        let result = engine.allocate(&mut contract, None, Money::from_major(2_001), &time, &mut events);

        assert!(matches!(result, Err(EngineError::Overpayment { .. })));
        assert_eq!(contract, before);
        assert!(events.is_empty());

        // exact payoff is fine
        engine
            .allocate(&mut contract, None, Money::from_major(2_000), &time, &mut events)
            .unwrap();
        assert_eq!(contract.outstanding(), Money::ZERO);
    }

    #[test]
    fn test_credit_balance_consumed_first() {
        let time = clock();
        let mut events = EventStore::new();
        let mut contract = contract(&[(1_000, date(2025, 1, 1)), (1_000, date(2025, 2, 1))]);
        let engine = AllocationEngine::new(
            OverpaymentPolicy::CreditBalance,
            StatusDeriver::default(),
            Money::TOLERANCE,
        );

        engine
            .allocate(&mut contract, None, Money::from_major(1_200), &time, &mut events)
            .unwrap();
        assert_eq!(contract.installments()[1].amount_paid(), Money::from_major(200));
        assert_eq!(contract.credit_balance(), Money::ZERO);

        let result = engine
            .allocate(&mut contract, None, Money::from_major(1_300), &time, &mut events)
            .unwrap();
        assert_eq!(result.credited, Money::from_major(500));
        assert_eq!(contract.credit_balance(), Money::from_major(500));

        // plan fully paid: a new entry picks up the held credit first
        contract.push_installment(Installment::new(
            3,
            "Installment 3/3",
            InstallmentKind::Installment,
            date(2025, 3, 1),
            Money::from_major(700),
            &StatusDeriver::default(),
            date(2025, 1, 10),
        ));
        let result = engine
            .allocate(&mut contract, None, Money::from_major(200), &time, &mut events)
            .unwrap();
        assert_eq!(result.credit_used, Money::from_major(500));
        assert_eq!(result.allocated, Money::from_major(700));
        assert!(contract.installments()[2].is_paid());
        assert_eq!(contract.credit_balance(), Money::ZERO);
    }

    #[test]
    fn test_non_positive_covered() {
        let time = clock();
        let mut events = EventStore::new();
        let mut contract = contract(&[(1_000, date(2025, 1, 1))]);

        let result = AllocationEngine::default().allocate(&mut contract, None, Money::ZERO, &time, &mut events);
        assert!(matches!(result, Err(EngineError::InvalidPayment { .. })));
    }

    #[test]
    fn test_trail_rows() {
        let time = clock();
        let mut events = EventStore::new();
        let mut contract = contract(&[(1_000, date(2025, 1, 1)), (1_000, date(2025, 2, 1))]);
        let payment_id = Uuid::new_v4();

        let result = AllocationEngine::default()
            .allocate(&mut contract, Some(payment_id), Money::from_major(1_500), &time, &mut events)
            .unwrap();

        let trail = result.trail(payment_id);
        assert_eq!(trail.len(), 2);
        assert!(trail.iter().all(|row| row.payment_id == payment_id));
        let total: Money = trail.iter().map(|row| row.amount_applied).sum();
        assert_eq!(total, Money::from_major(1_500));
    }

    #[test]
    fn test_downward_adjustment_nets_against_payoff() {
        let time = clock();
        let today = date(2025, 1, 10);
        let deriver = StatusDeriver::default();
        let mut events = EventStore::new();
        let mut contract = contract(&[(5_000, date(2025, 1, 1)), (5_000, date(2025, 2, 1))]);

        contract.installments_mut()[1].set_amount(Money::from_major(6_000), &deriver, today);
        contract.recompute_totals();
        let adjustment = crate::schedule::Rebalancer::default()
            .rebalance(&mut contract, &deriver, today)
            .unwrap();
        assert_eq!(contract.installment(adjustment).unwrap().residual(), Money::from_major(-1_000));

        let result = AllocationEngine::default()
            .allocate(&mut contract, None, Money::from_major(10_000), &time, &mut events)
            .unwrap();

        assert!(contract.installments().iter().all(|i| i.is_paid()));
        assert_eq!(contract.balance(), Money::ZERO);
        assert_eq!(contract.outstanding(), Money::ZERO);
        assert_eq!(result.allocated, Money::from_major(10_000));
        assert_eq!(result.unallocated, Money::ZERO);
        assert_eq!(result.lines[0].installment_id, adjustment);
        assert_eq!(result.lines[0].amount_applied, Money::from_major(-1_000));
    }

    #[test]
    fn test_downward_adjustment_waits_when_nothing_is_owed() {
        let time = clock();
        let today = date(2025, 1, 10);
        let deriver = StatusDeriver::default();
        let mut events = EventStore::new();
        let mut contract = contract(&[(5_000, date(2025, 1, 1))]);

        contract.installments_mut()[0].set_amount_paid(Money::from_major(5_000), &deriver, today);
        contract.push_installment(Installment::new(
            999,
            "Balance Adjustment",
            InstallmentKind::Balloon,
            date(2025, 1, 1),
            Money::from_major(-500),
            &deriver,
            today,
        ));

        let result = AllocationEngine::default()
            .allocate(&mut contract, None, Money::from_major(100), &time, &mut events)
            .unwrap();

        assert!(result.lines.is_empty());
        assert_eq!(result.unallocated, Money::from_major(100));
        assert_eq!(contract.installments()[1].residual(), Money::from_major(-500));
    }
}

use chrono::NaiveDate;
use tracing::info;

use crate::contract::{Installment, SaleContract};
use crate::decimal::Money;
use crate::status::StatusDeriver;
use crate::types::{InstallmentId, InstallmentKind};

use super::InstallmentSpec;

/// lowest sequence given to balancing entries so they sort after the plan
pub const ADJUSTMENT_SEQUENCE: u32 = 999;

/// reconciles a plan total with the contract's sale price
///
/// Rebalancing is additive: prior balancing entries are never edited, a new
/// one is appended for whatever difference remains.
pub struct Rebalancer {
    tolerance: Money,
}

impl Rebalancer {
    pub fn new(tolerance: Money) -> Self {
        Self { tolerance }
    }

    /// the balancing entry the contract needs, if any
    pub fn adjustment(&self, contract: &SaleContract, today: NaiveDate) -> Option<InstallmentSpec> {
        let difference = contract.sale_price() - contract.plan_total();
        if difference.abs() <= self.tolerance {
            return None;
        }

        let sequence = contract
            .max_sequence()
            .map(|max| max.saturating_add(1).max(ADJUSTMENT_SEQUENCE))
            .unwrap_or(ADJUSTMENT_SEQUENCE);

        Some(InstallmentSpec {
            sequence,
            name: "Balance Adjustment".to_string(),
            kind: InstallmentKind::Balloon,
            date_due: contract.latest_due_date().unwrap_or(today),
            amount: difference,
        })
    }

    /// append the balancing entry; returns its id when one was needed
    pub fn rebalance(
        &self,
        contract: &mut SaleContract,
        deriver: &StatusDeriver,
        today: NaiveDate,
    ) -> Option<InstallmentId> {
        let spec = self.adjustment(contract, today)?;
        let installment = Installment::from_spec(&spec, deriver, today);
        let id = installment.id;

        info!(
            "rebalancing contract {}: adding {} due {}",
            contract.reference, spec.amount, spec.date_due
        );
        contract.push_installment(installment);

        Some(id)
    }
}

impl Default for Rebalancer {
    fn default() -> Self {
        Self::new(Money::TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CurrencyCode;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn contract_with(price: i64, amounts: &[(i64, NaiveDate)]) -> SaleContract {
        let deriver = StatusDeriver::default();
        let mut contract = SaleContract::new(
            "CUST-9".to_string(),
            Uuid::new_v4(),
            Money::from_major(price),
            CurrencyCode::new("TRY").unwrap(),
            date(2025, 1, 1),
        );
        for (i, (amount, due)) in amounts.iter().enumerate() {
            contract.push_installment(Installment::new(
                i as u32 + 1,
                format!("Installment {}", i + 1),
                InstallmentKind::Installment,
                *due,
                Money::from_major(*amount),
                &deriver,
                date(2025, 1, 1),
            ));
        }
        contract
    }

    #[test]
    fn test_rebalance_adds_shortfall() {
        let deriver = StatusDeriver::default();
        let mut contract = contract_with(10_000, &[(4_000, date(2025, 2, 1)), (4_000, date(2025, 3, 1))]);

        let id = Rebalancer::default()
            .rebalance(&mut contract, &deriver, date(2025, 1, 15))
            .unwrap();

        let entry = contract.installment(id).unwrap();
        assert_eq!(entry.amount(), Money::from_major(2_000));
        assert_eq!(entry.kind, InstallmentKind::Balloon);
        assert_eq!(entry.date_due(), date(2025, 3, 1));
        assert_eq!(entry.sequence, ADJUSTMENT_SEQUENCE);
        assert!(contract.is_balanced(Money::TOLERANCE));
    }

    #[test]
    fn test_rebalance_negative_difference() {
        let deriver = StatusDeriver::default();
        let mut contract = contract_with(7_000, &[(4_000, date(2025, 2, 1)), (4_000, date(2025, 3, 1))]);

        let id = Rebalancer::default()
            .rebalance(&mut contract, &deriver, date(2025, 1, 15))
            .unwrap();

        assert_eq!(contract.installment(id).unwrap().amount(), Money::from_major(-1_000));
        assert!(contract.is_balanced(Money::TOLERANCE));
    }

    #[test]
    fn test_rebalance_converges() {
        let deriver = StatusDeriver::default();
        let mut contract = contract_with(9_999, &[(3_333, date(2025, 2, 1))]);
        let rebalancer = Rebalancer::default();

        assert!(rebalancer.rebalance(&mut contract, &deriver, date(2025, 1, 1)).is_some());
        let count = contract.installments().len();

        assert!(rebalancer.rebalance(&mut contract, &deriver, date(2025, 1, 1)).is_none());
        assert_eq!(contract.installments().len(), count);
    }

    #[test]
    fn test_rebalance_empty_plan_uses_today() {
        let deriver = StatusDeriver::default();
        let mut contract = contract_with(5_000, &[]);

        let id = Rebalancer::default()
            .rebalance(&mut contract, &deriver, date(2025, 5, 5))
            .unwrap();

        let entry = contract.installment(id).unwrap();
        assert_eq!(entry.date_due(), date(2025, 5, 5));
        assert_eq!(entry.amount(), Money::from_major(5_000));
    }

    #[test]
    fn test_sequence_stays_after_existing_entries() {
        let deriver = StatusDeriver::default();
        let mut contract = contract_with(10_000, &[(4_000, date(2025, 2, 1))]);
        let rebalancer = Rebalancer::default();

        rebalancer.rebalance(&mut contract, &deriver, date(2025, 1, 1)).unwrap();
        contract.set_sale_price(Money::from_major(12_000));
        let second = rebalancer.rebalance(&mut contract, &deriver, date(2025, 1, 1)).unwrap();

        assert_eq!(contract.installment(second).unwrap().sequence, ADJUSTMENT_SEQUENCE + 1);
    }

    #[test]
    fn test_within_tolerance_is_left_alone() {
        let mut contract = contract_with(10_000, &[(10_000, date(2025, 2, 1))]);
        contract.set_sale_price(Money::from_str_exact("10000.009").unwrap());

        assert!(Rebalancer::default().adjustment(&contract, date(2025, 1, 1)).is_none());
    }
}

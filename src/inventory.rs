use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contract::SaleContract;
use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::types::{BlockId, ContractId, ContractState, CurrencyCode, ProjectId, UnitId, UnitState};

/// development project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub city: Option<String>,
    /// currency units of this project are listed in
    pub currency: CurrencyCode,
}

impl Project {
    pub fn new(name: impl Into<String>, currency: CurrencyCode) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            city: None,
            currency,
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }
}

/// building within a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub project_id: ProjectId,
    pub name: String,
}

impl Block {
    pub fn new(project: &Project, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project.id,
            name: name.into(),
        }
    }
}

/// sellable unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub project_id: ProjectId,
    pub block_id: Option<BlockId>,
    pub name: String,
    pub floor: Option<String>,
    pub gross_m2: Option<Decimal>,
    pub net_m2: Option<Decimal>,
    pub list_price: Money,
    pub currency: CurrencyCode,
    state: UnitState,
}

impl Unit {
    pub fn new(project: &Project, block: Option<&Block>, name: impl Into<String>, list_price: Money) -> Result<Self> {
        if let Some(block) = block {
            if block.project_id != project.id {
                return Err(EngineError::InvalidState {
                    current: format!("block {} of project {}", block.name, block.project_id),
                    expected: format!("a block of project {}", project.id),
                });
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            project_id: project.id,
            block_id: block.map(|b| b.id),
            name: name.into(),
            floor: None,
            gross_m2: None,
            net_m2: None,
            list_price,
            currency: project.currency.clone(),
            state: UnitState::Available,
        })
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    /// `Project - Block - Unit`, or `Project - Unit` without a block
    pub fn display_name(&self, project: &Project, block: Option<&Block>) -> String {
        match block {
            Some(block) => format!("{} - {} - {}", project.name, block.name, self.name),
            None => format!("{} - {}", project.name, self.name),
        }
    }

    /// a contract can be drafted against this unit
    pub fn is_sellable(&self) -> bool {
        matches!(self.state, UnitState::Available | UnitState::Option)
    }

    /// hold for a prospective buyer
    pub fn reserve(&mut self) -> Result<UnitState> {
        self.transition(UnitState::Option, &[UnitState::Available])
    }

    /// drop a reservation, or return a unit whose sale was cancelled
    pub fn release(&mut self) -> Result<UnitState> {
        self.transition(UnitState::Available, &[UnitState::Option, UnitState::Sold])
    }

    pub fn mark_sold(&mut self) -> Result<UnitState> {
        self.transition(UnitState::Sold, &[UnitState::Available, UnitState::Option])
    }

    pub fn hand_over(&mut self) -> Result<UnitState> {
        self.transition(UnitState::Handover, &[UnitState::Sold])
    }

    /// move to `to`, returning the previous state
    fn transition(&mut self, to: UnitState, from: &[UnitState]) -> Result<UnitState> {
        if !from.contains(&self.state) {
            let expected = from
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" or ");
            return Err(EngineError::InvalidState {
                current: self.state.to_string(),
                expected,
            });
        }
        let old = self.state;
        self.state = to;
        Ok(old)
    }
}

/// sale figures of a unit, taken from its confirmed contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitMetrics {
    pub unit_id: UnitId,
    pub contract_id: Option<ContractId>,
    pub sold_value: Money,
    pub collected: Money,
    pub receivable: Money,
}

impl UnitMetrics {
    pub fn for_unit<'a>(unit: &Unit, contracts: impl IntoIterator<Item = &'a SaleContract>) -> Self {
        let active = contracts
            .into_iter()
            .find(|c| c.unit_id == unit.id && c.state == ContractState::Confirmed);

        match active {
            Some(contract) => Self {
                unit_id: unit.id,
                contract_id: Some(contract.id),
                sold_value: contract.sale_price(),
                collected: contract.total_paid(),
                receivable: contract.balance(),
            },
            None => Self {
                unit_id: unit.id,
                contract_id: None,
                sold_value: Money::ZERO,
                collected: Money::ZERO,
                receivable: Money::ZERO,
            },
        }
    }
}

/// number of units in each state for a project
pub fn state_counts<'a>(project: &Project, units: impl IntoIterator<Item = &'a Unit>) -> Vec<(UnitState, usize)> {
    let mut counts = [
        (UnitState::Available, 0),
        (UnitState::Option, 0),
        (UnitState::Sold, 0),
        (UnitState::Handover, 0),
    ];
    for unit in units.into_iter().filter(|u| u.project_id == project.id) {
        if let Some(entry) = counts.iter_mut().find(|(state, _)| *state == unit.state) {
            entry.1 += 1;
        }
    }
    counts.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn project() -> Project {
        Project::new("Marina Park", CurrencyCode::new("TRY").unwrap()).with_city("Izmir")
    }

    #[test]
    fn test_unit_lifecycle() {
        let project = project();
        let block = Block::new(&project, "A");
        let mut unit = Unit::new(&project, Some(&block), "A-12", Money::from_major(4_500_000)).unwrap();

        assert_eq!(unit.display_name(&project, Some(&block)), "Marina Park - A - A-12");
        assert_eq!(unit.currency.as_str(), "TRY");
        assert!(unit.is_sellable());

        assert_eq!(unit.reserve().unwrap(), UnitState::Available);
        assert_eq!(unit.mark_sold().unwrap(), UnitState::Option);
        assert!(unit.reserve().is_err());
        assert!(!unit.is_sellable());

        unit.hand_over().unwrap();
        assert_eq!(unit.state(), UnitState::Handover);
        assert!(matches!(unit.release(), Err(EngineError::InvalidState { .. })));
    }

    #[test]
    fn test_block_must_belong_to_project() {
        let project = project();
        let other = Project::new("Hill Side", CurrencyCode::new("TRY").unwrap());
        let block = Block::new(&other, "B");

        assert!(Unit::new(&project, Some(&block), "B-1", Money::from_major(1)).is_err());
    }

    #[test]
    fn test_metrics_from_confirmed_contract() {
        let project = project();
        let unit = Unit::new(&project, None, "V-3", Money::from_major(900_000)).unwrap();

        let mut draft = SaleContract::new(
            "CUST-1".to_string(),
            unit.id,
            Money::from_major(850_000),
            project.currency.clone(),
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
        );
        let metrics = UnitMetrics::for_unit(&unit, [&draft]);
        assert_eq!(metrics.contract_id, None);
        assert_eq!(metrics.sold_value, Money::ZERO);

        draft.confirm().unwrap();
        let metrics = UnitMetrics::for_unit(&unit, [&draft]);
        assert_eq!(metrics.contract_id, Some(draft.id));
        assert_eq!(metrics.sold_value, Money::from_major(850_000));
        assert_eq!(metrics.receivable, Money::from_major(850_000));
    }

    #[test]
    fn test_state_counts() {
        let project = project();
        let mut units: Vec<Unit> = (1..=3)
            .map(|i| Unit::new(&project, None, format!("U-{}", i), Money::from_major(100)).unwrap())
            .collect();
        units[0].mark_sold().unwrap();

        let counts = state_counts(&project, &units);
        assert_eq!(counts[0], (UnitState::Available, 2));
        assert_eq!(counts[2], (UnitState::Sold, 1));
    }
}

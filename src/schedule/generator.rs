use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::types::{BalloonTiming, InstallmentKind, MidBalloonPolicy};

use super::{InstallmentSpec, PlanTerms};

/// payment plan generator
pub struct ScheduleGenerator {
    tolerance: Money,
    mid_balloon_policy: MidBalloonPolicy,
}

impl ScheduleGenerator {
    pub fn new(tolerance: Money, mid_balloon_policy: MidBalloonPolicy) -> Self {
        Self {
            tolerance,
            mid_balloon_policy,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.tolerance, config.schedule.mid_balloon_policy)
    }

    /// synthesize the installment sequence for the given terms
    ///
    /// Emission order is down payment, regular installments, balloon;
    /// sequence numbers follow emission order starting at 1. The face
    /// amounts sum to the final price within tolerance.
    pub fn generate(&self, terms: &PlanTerms) -> Result<Vec<InstallmentSpec>> {
        self.validate(terms)?;

        let final_price = terms.final_price();
        let down_payment = terms.down_payment_amount();
        let balloon = terms.balloon_amount();
        let remainder = final_price - down_payment - balloon;

        if remainder < -self.tolerance {
            return Err(plan_error(format!(
                "down payment {} and balloon {} exceed final price {}",
                down_payment, balloon, final_price
            )));
        }

        if terms.installment_count == 0 && !remainder.is_negligible(self.tolerance) {
            return Err(plan_error(format!(
                "no installments requested but {} would remain unscheduled",
                remainder
            )));
        }

        let mut plan = Vec::new();
        let mut next_sequence = 1u32;

        if down_payment.is_positive() {
            plan.push(InstallmentSpec {
                sequence: next_sequence,
                name: "Down Payment".to_string(),
                kind: InstallmentKind::DownPayment,
                date_due: terms.down_payment_date,
                amount: down_payment,
            });
            next_sequence += 1;
        }

        let count = u32::try_from(terms.installment_count).unwrap_or(0);
        if count > 0 {
            let monthly_amount = remainder / Decimal::from(count);

            for i in 1..=count {
                plan.push(InstallmentSpec {
                    sequence: next_sequence,
                    name: format!("Installment {}/{}", i, count),
                    kind: InstallmentKind::Installment,
                    date_due: month_offset(terms.first_installment_date, i - 1)?,
                    amount: monthly_amount,
                });
                next_sequence += 1;
            }
        }

        if balloon.is_positive() {
            // end policy: same date as the last scheduled entry
            let date_due = plan
                .last()
                .map(|spec| spec.date_due)
                .unwrap_or(terms.first_installment_date);

            plan.push(InstallmentSpec {
                sequence: next_sequence,
                name: "Balloon Payment".to_string(),
                kind: InstallmentKind::Balloon,
                date_due,
                amount: balloon,
            });
        }

        let total: Money = plan.iter().map(|spec| spec.amount).sum();
        debug!(
            "plan for final price {}: {} entries totalling {}",
            final_price,
            plan.len(),
            total
        );
        info!(
            "generated {} installments (down payment {}, balloon {})",
            plan.len(),
            down_payment,
            balloon
        );

        Ok(plan)
    }

    fn validate(&self, terms: &PlanTerms) -> Result<()> {
        if terms.installment_count < 0 {
            return Err(plan_error(format!(
                "installment count cannot be negative: {}",
                terms.installment_count
            )));
        }

        if !terms.sale_price.is_positive() {
            return Err(plan_error(format!(
                "sale price must be positive: {}",
                terms.sale_price
            )));
        }

        if terms.maturity_difference.is_negative() || terms.discount.is_negative() {
            return Err(plan_error(format!(
                "maturity difference {} and discount {} cannot be negative",
                terms.maturity_difference, terms.discount
            )));
        }

        if !terms.final_price().is_positive() {
            return Err(plan_error(format!(
                "final price must be positive: {}",
                terms.final_price()
            )));
        }

        if terms.down_payment.is_negative() {
            return Err(plan_error("down payment cannot be negative".to_string()));
        }

        if terms.balloon.is_negative() {
            return Err(plan_error("balloon cannot be negative".to_string()));
        }

        if terms.balloon_timing == BalloonTiming::Mid && terms.balloon_amount().is_positive() {
            match self.mid_balloon_policy {
                MidBalloonPolicy::Reject => {
                    return Err(plan_error(
                        "mid-plan balloon timing is not supported".to_string(),
                    ));
                }
                MidBalloonPolicy::AliasToEnd => {
                    warn!("mid-plan balloon timing requested, placing balloon at the end");
                }
            }
        }

        Ok(())
    }
}

impl Default for ScheduleGenerator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::baseline())
    }
}

/// `start` plus whole calendar months, clamped to month end
fn month_offset(start: NaiveDate, months: u32) -> Result<NaiveDate> {
    start
        .checked_add_months(Months::new(months))
        .ok_or_else(|| plan_error(format!("due date out of range: {} + {} months", start, months)))
}

fn plan_error(message: String) -> EngineError {
    EngineError::InvalidPlan { message }
}

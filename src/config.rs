use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::types::{CancellationPolicy, MidBalloonPolicy, OverpaymentPolicy, RateSide};

pub const DEFAULT_FEED_URL: &str = "https://www.tcmb.gov.tr/kurlar";

/// engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// below this a residual counts as settled; above it a plan is out of balance
    pub tolerance: Money,
    pub status: StatusConfig,
    pub allocation: AllocationConfig,
    pub schedule: ScheduleConfig,
    pub feed: FeedConfig,
}

/// status derivation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// unpaid installments due within this many days are `upcoming`
    pub upcoming_window_days: u32,
}

/// allocation behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationConfig {
    pub overpayment_policy: OverpaymentPolicy,
    pub cancellation_policy: CancellationPolicy,
}

/// schedule generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub mid_balloon_policy: MidBalloonPolicy,
}

/// central-bank rate feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    pub rate_side: RateSide,
}

impl EngineConfig {
    /// behaviour compatible with the established collections workflow:
    /// leftover funds are discarded and posted payments are final
    pub fn baseline() -> Self {
        Self {
            tolerance: Money::TOLERANCE,
            status: StatusConfig {
                upcoming_window_days: 30,
            },
            allocation: AllocationConfig {
                overpayment_policy: OverpaymentPolicy::Discard,
                cancellation_policy: CancellationPolicy::Reject,
            },
            schedule: ScheduleConfig {
                mid_balloon_policy: MidBalloonPolicy::Reject,
            },
            feed: FeedConfig {
                base_url: DEFAULT_FEED_URL.to_string(),
                rate_side: RateSide::Buying,
            },
        }
    }

    /// allocation trail enabled: posted payments can be reversed and
    /// overpayments are held as contract credit
    pub fn with_allocation_trail() -> Self {
        let mut config = Self::baseline();
        config.allocation = AllocationConfig {
            overpayment_policy: OverpaymentPolicy::CreditBalance,
            cancellation_policy: CancellationPolicy::Reverse,
        };
        config
    }

    pub fn overpayment_policy(mut self, policy: OverpaymentPolicy) -> Self {
        self.allocation.overpayment_policy = policy;
        self
    }

    pub fn cancellation_policy(mut self, policy: CancellationPolicy) -> Self {
        self.allocation.cancellation_policy = policy;
        self
    }

    pub fn mid_balloon_policy(mut self, policy: MidBalloonPolicy) -> Self {
        self.schedule.mid_balloon_policy = policy;
        self
    }

    pub fn upcoming_window_days(mut self, days: u32) -> Self {
        self.status.upcoming_window_days = days;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tolerance.is_negative() || self.tolerance.is_zero() {
            return Err(EngineError::InvalidConfiguration {
                message: format!("tolerance must be positive, got {}", self.tolerance),
            });
        }

        let url = self.feed.base_url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(EngineError::InvalidConfiguration {
                message: format!("feed base url must be http(s), got {:?}", self.feed.base_url),
            });
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::baseline()
    }
}

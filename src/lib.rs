pub mod allocation;
pub mod config;
pub mod contract;
pub mod currency;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod inventory;
pub mod schedule;
pub mod status;
pub mod store;
pub mod types;
pub mod views;

// re-export key types
pub use allocation::{AllocationEngine, AllocationLine, AllocationResult};
pub use config::EngineConfig;
pub use contract::{Installment, Payment, SaleContract};
pub use currency::{
    normalize, CentralBankFeed, FeedTransport, Normalized, RateRow, RateSheet, RateSource,
    RateTable,
};
pub use decimal::{ExchangeRate, Money, Rate};
pub use engine::{
    ContractRequest, InstallmentCorrection, PaymentRequest, SalesEngine, StatusTransition,
    SweepReport,
};
pub use errors::{EngineError, Result};
pub use events::{Event, EventStore};
pub use inventory::{Block, Project, Unit, UnitMetrics};
pub use schedule::{
    InstallmentSpec, PlanTerms, PlanTermsBuilder, PriceShare, Rebalancer, ScheduleGenerator,
};
pub use status::{Derived, StatusDeriver};
pub use store::{ContractRecord, ContractStore, MemoryStore};
pub use types::{
    BalloonTiming, CancellationPolicy, ContractId, ContractState, CurrencyCode, InstallmentId,
    InstallmentKind, MidBalloonPolicy, OverpaymentPolicy, PaymentAllocation, PaymentId,
    PaymentMethod, PaymentState, PaymentStatus, RateSide, UnitId, UnitState,
};
pub use views::{ContractView, PlanSummary};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;

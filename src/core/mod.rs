mod engine;
mod error;
mod presets;
mod types;

pub use engine::{build_ledger, resolve_tier, tier_value_summary};
pub use error::{CompensationError, Result};
pub use presets::{
    AVG_ORDER_VALUE, FIXED_SALARY, PARTNER_TYPES, PartnerType, PlanVariant, RETENTION_RATE,
    Scenario, ScenarioKind,
};
pub use types::{
    ACTIVE_MONTHS, Aggregates, CohortWindow, CompensationConfig, Ledger, MonthRecord,
    PORTFOLIO_WINDOW_MONTHS, PROJECTION_MONTHS, Tier, TierTable, TierValue,
};

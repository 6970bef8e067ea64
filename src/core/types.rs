use serde::{Deserialize, Serialize};

use super::error::{CompensationError, Result};

/// Months during which the representative acquires clients and draws a salary.
pub const ACTIVE_MONTHS: usize = 6;
/// Length of the projection, active and passive months together.
pub const PROJECTION_MONTHS: usize = 12;
/// Number of months after its origin month during which a cohort earns portfolio commission.
pub const PORTFOLIO_WINDOW_MONTHS: usize = 5;

/// A client-count band. `max: None` marks the open-ended top band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tier {
    pub min: u32,
    #[serde(default)]
    pub max: Option<u32>,
    pub percent: f64,
    pub label: String,
}

impl Tier {
    pub fn new(min: u32, max: Option<u32>, percent: f64, label: impl Into<String>) -> Self {
        Self {
            min,
            max,
            percent,
            label: label.into(),
        }
    }

    pub fn contains(&self, client_count: u32) -> bool {
        client_count >= self.min && self.max.is_none_or(|max| client_count <= max)
    }
}

/// Ordered tiers covering every non-negative client count exactly once.
///
/// Only constructible through [`TierTable::new`], so the engine never sees a
/// table with gaps, overlaps, or a bounded top band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Tier>", into = "Vec<Tier>")]
pub struct TierTable {
    tiers: Vec<Tier>,
}

impl TierTable {
    pub fn new(tiers: Vec<Tier>) -> Result<Self> {
        let Some(first) = tiers.first() else {
            return Err(invalid_table("table is empty".to_string()));
        };
        if first.min != 0 {
            return Err(invalid_table(format!(
                "first band '{}' must start at 0, starts at {}",
                first.label, first.min
            )));
        }

        for (idx, tier) in tiers.iter().enumerate() {
            if !tier.percent.is_finite() || tier.percent < 0.0 {
                return Err(invalid_table(format!(
                    "band '{}' has invalid percent {}",
                    tier.label, tier.percent
                )));
            }

            let next = tiers.get(idx + 1);
            match (tier.max, next) {
                (None, None) => {}
                (None, Some(_)) => {
                    return Err(invalid_table(format!(
                        "band '{}' is unbounded but is not the last band",
                        tier.label
                    )));
                }
                (Some(max), None) => {
                    return Err(invalid_table(format!(
                        "last band '{}' must be unbounded, ends at {max}",
                        tier.label
                    )));
                }
                (Some(max), Some(next)) => {
                    if max < tier.min {
                        return Err(invalid_table(format!(
                            "band '{}' ends at {max} before it starts at {}",
                            tier.label, tier.min
                        )));
                    }
                    if max.checked_add(1) != Some(next.min) {
                        return Err(invalid_table(format!(
                            "band '{}' must start at {} to follow '{}', starts at {}",
                            next.label,
                            u64::from(max) + 1,
                            tier.label,
                            next.min
                        )));
                    }
                    if next.percent < tier.percent {
                        return Err(invalid_table(format!(
                            "band '{}' pays {}% which is less than the {}% of '{}'",
                            next.label, next.percent, tier.percent, tier.label
                        )));
                    }
                }
            }
        }

        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// The lowest band. Always present on a validated table.
    pub fn first(&self) -> &Tier {
        &self.tiers[0]
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl TryFrom<Vec<Tier>> for TierTable {
    type Error = CompensationError;

    fn try_from(tiers: Vec<Tier>) -> Result<Self> {
        Self::new(tiers)
    }
}

impl From<TierTable> for Vec<Tier> {
    fn from(table: TierTable) -> Self {
        table.tiers
    }
}

fn invalid_table(reason: String) -> CompensationError {
    CompensationError::InvalidTierTable(reason)
}

/// Constants of a compensation plan. Rates are fractions, not percents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationConfig {
    pub fixed_salary: f64,
    pub avg_order_value: f64,
    pub retention_rate: f64,
    pub portfolio_commission_rate: f64,
}

impl CompensationConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("fixed salary", self.fixed_salary),
            ("average order value", self.avg_order_value),
            ("portfolio commission rate", self.portfolio_commission_rate),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CompensationError::InvalidConfig(format!(
                    "{name} must be a finite value >= 0, got {value}"
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.retention_rate) {
            return Err(CompensationError::InvalidConfig(format!(
                "retention rate must be between 0 and 1, got {}",
                self.retention_rate
            )));
        }

        Ok(())
    }
}

/// Origin months (1-based, inclusive) of the cohorts inside a month's trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortWindow {
    pub first_month: u32,
    pub last_month: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthRecord {
    pub month_index: u32,
    pub new_clients: u32,
    pub tier_label: Option<String>,
    pub tier_percent: f64,
    pub new_client_commission: f64,
    pub portfolio_size: u64,
    pub portfolio_commission: f64,
    pub fixed_salary: f64,
    pub total_earnings: f64,
    pub partner_label: Option<String>,
    pub is_active_month: bool,
    pub cohort_window: Option<CohortWindow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub active_total: f64,
    pub passive_total: f64,
    pub grand_total: f64,
    pub total_clients_acquired: u64,
    pub average_cost_per_acquisition: f64,
    pub active_monthly_average: f64,
    pub passive_monthly_average: f64,
    pub average_monthly_earnings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    pub months: Vec<MonthRecord>,
    pub aggregates: Aggregates,
}

/// What one client acquired in a given band is projected to earn the representative.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierValue {
    pub label: String,
    pub percent: f64,
    pub acquisition_commission: f64,
    pub portfolio_commission: f64,
    pub lifetime_value: f64,
}

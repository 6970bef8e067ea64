//! Plan settings: a built-in plan variant, optionally adjusted by a TOML file
//! and then by command-line flags or API fields.
//!
//! Money amounts are absolute; rates on every outer surface are percents and
//! are converted to fractions when the plan is resolved.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::core::{
    CompensationConfig, CompensationError, Ledger, PlanVariant, Result, Scenario, ScenarioKind,
    Tier, TierTable, TierValue, build_ledger, tier_value_summary,
};

/// Compensation constants to change. Unset fields keep the variant's value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompensationOverrides {
    pub fixed_salary: Option<f64>,
    pub avg_order_value: Option<f64>,
    /// Percent of each cohort still billable after acquisition.
    pub retention_rate: Option<f64>,
    /// Percent of a retained client's monthly order paid as portfolio commission.
    pub portfolio_commission_rate: Option<f64>,
}

impl CompensationOverrides {
    fn overlay(self, top: CompensationOverrides) -> CompensationOverrides {
        CompensationOverrides {
            fixed_salary: top.fixed_salary.or(self.fixed_salary),
            avg_order_value: top.avg_order_value.or(self.avg_order_value),
            retention_rate: top.retention_rate.or(self.retention_rate),
            portfolio_commission_rate: top
                .portfolio_commission_rate
                .or(self.portfolio_commission_rate),
        }
    }

    fn apply(self, base: CompensationConfig) -> CompensationConfig {
        CompensationConfig {
            fixed_salary: self.fixed_salary.unwrap_or(base.fixed_salary),
            avg_order_value: self.avg_order_value.unwrap_or(base.avg_order_value),
            retention_rate: self
                .retention_rate
                .map_or(base.retention_rate, |pct| pct / 100.0),
            portfolio_commission_rate: self
                .portfolio_commission_rate
                .map_or(base.portfolio_commission_rate, |pct| pct / 100.0),
        }
    }
}

/// One layer of settings, as read from a file or collected from flags.
///
/// ```toml
/// variant = "steep"
/// scenario = "optimistic"
///
/// [compensation]
/// fixed_salary = 30000
/// retention_rate = 60
///
/// [[tiers]]
/// min = 0
/// max = 99
/// percent = 10
/// label = "0–99"
///
/// [[tiers]]
/// min = 100
/// percent = 12
/// label = "100+"
/// ```
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanSettings {
    pub variant: Option<PlanVariant>,
    pub scenario: Option<ScenarioKind>,
    pub compensation: CompensationOverrides,
    /// Replaces the variant's tier table when present.
    pub tiers: Option<Vec<Tier>>,
}

impl PlanSettings {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| CompensationError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), "loaded plan settings");
        Ok(settings)
    }

    /// Layers `top` over `self`; any field set in `top` wins.
    pub fn overlay(self, top: PlanSettings) -> PlanSettings {
        PlanSettings {
            variant: top.variant.or(self.variant),
            scenario: top.scenario.or(self.scenario),
            compensation: self.compensation.overlay(top.compensation),
            tiers: top.tiers.or(self.tiers),
        }
    }

    pub fn resolve(&self) -> Result<Settings> {
        let variant = self.variant.unwrap_or(PlanVariant::Standard);
        let tiers = match &self.tiers {
            Some(tiers) => TierTable::new(tiers.clone())?,
            None => variant.tier_table()?,
        };
        let config = self.compensation.apply(variant.config());
        config.validate()?;

        Ok(Settings {
            scenario: self.scenario.unwrap_or(ScenarioKind::Realistic),
            plan: CompensationPlan {
                variant,
                tiers,
                config,
            },
        })
    }
}

/// A validated plan: the tier table and constants the engine runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensationPlan {
    pub variant: PlanVariant,
    pub tiers: TierTable,
    pub config: CompensationConfig,
}

impl CompensationPlan {
    pub fn preset(variant: PlanVariant) -> Result<Self> {
        Ok(Self {
            variant,
            tiers: variant.tier_table()?,
            config: variant.config(),
        })
    }

    pub fn project<S: AsRef<str>>(&self, schedule: &[u32], partner_labels: &[S]) -> Result<Ledger> {
        build_ledger(schedule, partner_labels, &self.tiers, &self.config)
    }

    pub fn project_scenario(&self, scenario: &Scenario) -> Result<Ledger> {
        self.project(&scenario.schedule, &scenario.partner_labels)
    }

    pub fn tier_values(&self) -> Vec<TierValue> {
        tier_value_summary(&self.tiers, &self.config)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub scenario: ScenarioKind,
    pub plan: CompensationPlan,
}

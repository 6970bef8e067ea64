use serde::{Deserialize, Serialize};

use super::error::{CompensationError, Result};
use super::types::{CompensationConfig, Tier, TierTable};

pub const FIXED_SALARY: f64 = 25_000.0;
pub const AVG_ORDER_VALUE: f64 = 2_000.0;
pub const RETENTION_RATE: f64 = 0.5;

const BAND_EDGES: [(u32, Option<u32>, &str); 6] = [
    (0, Some(20), "0–20"),
    (21, Some(50), "21–50"),
    (51, Some(100), "51–100"),
    (101, Some(200), "101–200"),
    (201, Some(400), "201–400"),
    (401, None, "400+"),
];

/// The two commission plans in circulation. They share band edges, salary,
/// order value and retention, and differ in tier percents and portfolio rate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanVariant {
    /// 10-15 % acquisition tiers, 5 % portfolio commission.
    Standard,
    /// 10-22 % acquisition tiers, 2 % portfolio commission.
    Steep,
}

impl PlanVariant {
    pub const ALL: [PlanVariant; 2] = [PlanVariant::Standard, PlanVariant::Steep];

    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "steep" => Ok(Self::Steep),
            _ => Err(CompensationError::UnknownVariant(name.to_string())),
        }
    }

    fn tier_percents(self) -> [f64; 6] {
        match self {
            Self::Standard => [10.0, 11.0, 12.0, 13.0, 14.0, 15.0],
            Self::Steep => [10.0, 12.0, 15.0, 18.0, 20.0, 22.0],
        }
    }

    pub fn portfolio_commission_rate(self) -> f64 {
        match self {
            Self::Standard => 0.05,
            Self::Steep => 0.02,
        }
    }

    pub fn tier_table(self) -> Result<TierTable> {
        let tiers = BAND_EDGES
            .iter()
            .zip(self.tier_percents())
            .map(|(&(min, max, label), percent)| Tier::new(min, max, percent, label))
            .collect();
        TierTable::new(tiers)
    }

    pub fn config(self) -> CompensationConfig {
        CompensationConfig {
            fixed_salary: FIXED_SALARY,
            avg_order_value: AVG_ORDER_VALUE,
            retention_rate: RETENTION_RATE,
            portfolio_commission_rate: self.portfolio_commission_rate(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    Conservative,
    Realistic,
    Optimistic,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 3] = [
        ScenarioKind::Conservative,
        ScenarioKind::Realistic,
        ScenarioKind::Optimistic,
    ];

    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "realistic" => Ok(Self::Realistic),
            "optimistic" => Ok(Self::Optimistic),
            _ => Err(CompensationError::UnknownScenario(name.to_string())),
        }
    }

    pub fn scenario(self) -> Scenario {
        let (name, description, schedule, partner_labels): (_, _, [u32; 6], [&str; 6]) = match self
        {
            Self::Conservative => (
                "Conservative",
                "Cautious estimate with lower activity",
                [40, 60, 80, 100, 125, 150],
                [
                    "2× small village",
                    "1× small + 1× mini village",
                    "1× mid-size municipality",
                    "1× mid-size municipality",
                    "1× mid-size + 1× mini village",
                    "1× mid-size + 1× small village",
                ],
            ),
            Self::Realistic => (
                "Realistic",
                "Expected performance with active work",
                [50, 100, 200, 300, 400, 500],
                [
                    "1× small village",
                    "1× mid-size municipality",
                    "1× large municipality",
                    "1× large + 1× mid-size",
                    "2× large municipality",
                    "1× town + 1× mid-size",
                ],
            ),
            Self::Optimistic => (
                "Optimistic",
                "Maximum commitment and success rate",
                [100, 200, 400, 600, 800, 1000],
                [
                    "1× mid-size municipality",
                    "1× large municipality",
                    "2× large municipality",
                    "1× town + 1× large",
                    "2× towns",
                    "2× towns + 1× large",
                ],
            ),
        };

        Scenario {
            kind: self,
            name,
            description,
            schedule: schedule.to_vec(),
            partner_labels: partner_labels.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A named acquisition plan for the six active months.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub kind: ScenarioKind,
    pub name: &'static str,
    pub description: &'static str,
    pub schedule: Vec<u32>,
    pub partner_labels: Vec<String>,
}

/// Kinds of partner organisations a representative signs, with typical client yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerType {
    pub name: &'static str,
    pub population: &'static str,
    pub expected_clients: &'static str,
}

pub const PARTNER_TYPES: [PartnerType; 5] = [
    PartnerType {
        name: "Mini village",
        population: "~1,000 residents",
        expected_clients: "20–50 clients",
    },
    PartnerType {
        name: "Small village",
        population: "~3,000 residents",
        expected_clients: "50–100 clients",
    },
    PartnerType {
        name: "Mid-size municipality",
        population: "5,000–10,000 residents",
        expected_clients: "100–200 clients",
    },
    PartnerType {
        name: "Large municipality",
        population: "10,000–30,000 residents",
        expected_clients: "200–400 clients",
    },
    PartnerType {
        name: "Town",
        population: "30,000+ residents",
        expected_clients: "400+ clients",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_tier_tables_are_valid() {
        for variant in PlanVariant::ALL {
            let table = variant.tier_table().expect("preset table must validate");
            assert_eq!(table.len(), 6);
            assert_eq!(table.first().min, 0);
            assert!(table.tiers().last().is_some_and(|t| t.max.is_none()));
        }
    }

    #[test]
    fn preset_configs_are_valid() {
        for variant in PlanVariant::ALL {
            variant.config().validate().expect("preset config must validate");
        }
        assert_eq!(PlanVariant::Standard.config().portfolio_commission_rate, 0.05);
        assert_eq!(PlanVariant::Steep.config().portfolio_commission_rate, 0.02);
    }

    #[test]
    fn steep_variant_tops_out_at_twenty_two_percent() {
        let table = PlanVariant::Steep.tier_table().expect("valid table");
        let percents: Vec<f64> = table.tiers().iter().map(|t| t.percent).collect();
        assert_eq!(percents, vec![10.0, 12.0, 15.0, 18.0, 20.0, 22.0]);
    }

    #[test]
    fn every_scenario_has_six_months_of_schedule_and_labels() {
        for kind in ScenarioKind::ALL {
            let scenario = kind.scenario();
            assert_eq!(scenario.kind, kind);
            assert_eq!(scenario.schedule.len(), 6);
            assert_eq!(scenario.partner_labels.len(), 6);
        }
        assert_eq!(
            ScenarioKind::Realistic.scenario().schedule,
            vec![50, 100, 200, 300, 400, 500]
        );
    }

    #[test]
    fn selectors_parse_case_insensitively_and_reject_unknown_names() {
        assert_eq!(
            ScenarioKind::from_name(" Optimistic ").expect("known"),
            ScenarioKind::Optimistic
        );
        assert_eq!(PlanVariant::from_name("STEEP").expect("known"), PlanVariant::Steep);

        let err = ScenarioKind::from_name("reckless").expect_err("unknown scenario");
        assert!(matches!(err, CompensationError::UnknownScenario(ref n) if n == "reckless"));
        let err = PlanVariant::from_name("flat").expect_err("unknown variant");
        assert!(matches!(err, CompensationError::UnknownVariant(_)));
    }
}

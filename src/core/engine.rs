use tracing::{debug, trace, warn};

use super::error::{CompensationError, Result};
use super::types::{
    ACTIVE_MONTHS, Aggregates, CohortWindow, CompensationConfig, Ledger, MonthRecord,
    PORTFOLIO_WINDOW_MONTHS, PROJECTION_MONTHS, Tier, TierTable, TierValue,
};

/// Clients acquired in one active month, as seen by later portfolio calculations.
#[derive(Debug, Clone, Copy)]
struct Cohort {
    origin_month: usize,
    original_count: u32,
    retained_count: u64,
}

impl Cohort {
    fn open(origin_month: usize, original_count: u32, retention_rate: f64) -> Self {
        Self {
            origin_month,
            original_count,
            retained_count: retained_clients(original_count, retention_rate),
        }
    }

    fn is_in_window(self, month: usize) -> bool {
        month
            .checked_sub(self.origin_month)
            .is_some_and(|age| (1..=PORTFOLIO_WINDOW_MONTHS).contains(&age))
    }
}

/// State threaded through the month fold. Each step consumes it and hands back
/// the successor, so no month can observe cohorts opened after it.
#[derive(Debug)]
struct LedgerState {
    cohorts: Vec<Cohort>,
    months: Vec<MonthRecord>,
}

impl LedgerState {
    fn new() -> Self {
        Self {
            cohorts: Vec::with_capacity(ACTIVE_MONTHS),
            months: Vec::with_capacity(PROJECTION_MONTHS),
        }
    }

    fn portfolio_size(&self, month: usize) -> u64 {
        self.cohorts
            .iter()
            .filter(|c| c.is_in_window(month))
            .map(|c| c.retained_count)
            .sum()
    }

    fn cohort_window(&self, month: usize) -> Option<CohortWindow> {
        let mut in_window = self.cohorts.iter().filter(|c| c.is_in_window(month));
        let first = in_window.next()?;
        let last = in_window.last().unwrap_or(first);
        Some(CohortWindow {
            first_month: month_index(first.origin_month),
            last_month: month_index(last.origin_month),
        })
    }

    fn active_month(
        mut self,
        month: usize,
        new_clients: u32,
        partner_label: &str,
        tiers: &TierTable,
        config: &CompensationConfig,
    ) -> Self {
        let tier = resolve_tier(tiers, new_clients);
        let new_client_commission =
            f64::from(new_clients) * config.avg_order_value * (tier.percent / 100.0);
        let portfolio_size = self.portfolio_size(month);
        let portfolio_commission = portfolio_commission(portfolio_size, config);

        let record = MonthRecord {
            month_index: month_index(month),
            new_clients,
            tier_label: Some(tier.label.clone()),
            tier_percent: tier.percent,
            new_client_commission,
            portfolio_size,
            portfolio_commission,
            fixed_salary: config.fixed_salary,
            total_earnings: config.fixed_salary + new_client_commission + portfolio_commission,
            partner_label: Some(partner_label.to_string()),
            is_active_month: true,
            cohort_window: self.cohort_window(month),
        };

        let cohort = Cohort::open(month, new_clients, config.retention_rate);
        trace!(
            month = record.month_index,
            original = cohort.original_count,
            retained = cohort.retained_count,
            "opened cohort"
        );
        self.cohorts.push(cohort);
        self.months.push(record);
        self
    }

    fn passive_month(mut self, month: usize, config: &CompensationConfig) -> Self {
        let portfolio_size = self.portfolio_size(month);
        let portfolio_commission = portfolio_commission(portfolio_size, config);

        let record = MonthRecord {
            month_index: month_index(month),
            new_clients: 0,
            tier_label: None,
            tier_percent: 0.0,
            new_client_commission: 0.0,
            portfolio_size,
            portfolio_commission,
            fixed_salary: 0.0,
            total_earnings: portfolio_commission,
            partner_label: None,
            is_active_month: false,
            cohort_window: self.cohort_window(month),
        };

        self.months.push(record);
        self
    }
}

/// Returns the band containing `client_count`.
///
/// A validated [`TierTable`] always has exactly one such band. Falling back to
/// the lowest band is kept only as a last resort for release builds; debug
/// builds treat a miss as a bug.
pub fn resolve_tier(tiers: &TierTable, client_count: u32) -> &Tier {
    if let Some(tier) = tiers.tiers().iter().find(|t| t.contains(client_count)) {
        return tier;
    }

    if cfg!(debug_assertions) {
        panic!("validated tier table does not cover {client_count} clients");
    }
    warn!(client_count, "no tier matched, falling back to the lowest band");
    tiers.first()
}

/// Projects twelve months of earnings for a six-month acquisition schedule.
pub fn build_ledger<S: AsRef<str>>(
    schedule: &[u32],
    partner_labels: &[S],
    tiers: &TierTable,
    config: &CompensationConfig,
) -> Result<Ledger> {
    check_length("schedule", schedule.len())?;
    check_length("partner labels", partner_labels.len())?;

    let state = (0..PROJECTION_MONTHS).fold(LedgerState::new(), |state, month| {
        if month < ACTIVE_MONTHS {
            state.active_month(
                month,
                schedule[month],
                partner_labels[month].as_ref(),
                tiers,
                config,
            )
        } else {
            state.passive_month(month, config)
        }
    });

    let aggregates = aggregate(&state.months);
    debug!(
        active_total = aggregates.active_total,
        passive_total = aggregates.passive_total,
        clients = aggregates.total_clients_acquired,
        "built compensation ledger"
    );

    Ok(Ledger {
        months: state.months,
        aggregates,
    })
}

/// Per-band value of a single acquired client: the acquisition commission plus
/// the portfolio commission its retained share earns over the trailing window.
pub fn tier_value_summary(tiers: &TierTable, config: &CompensationConfig) -> Vec<TierValue> {
    let trailing = PORTFOLIO_WINDOW_MONTHS as f64
        * config.avg_order_value
        * config.retention_rate
        * config.portfolio_commission_rate;

    tiers
        .tiers()
        .iter()
        .map(|tier| {
            let acquisition = config.avg_order_value * (tier.percent / 100.0);
            TierValue {
                label: tier.label.clone(),
                percent: tier.percent,
                acquisition_commission: acquisition,
                portfolio_commission: trailing,
                lifetime_value: acquisition + trailing,
            }
        })
        .collect()
}

fn check_length(field: &'static str, actual: usize) -> Result<()> {
    if actual == ACTIVE_MONTHS {
        return Ok(());
    }
    Err(CompensationError::InvalidScheduleLength {
        field,
        expected: ACTIVE_MONTHS,
        actual,
    })
}

fn aggregate(months: &[MonthRecord]) -> Aggregates {
    let (active, passive) = months.split_at(ACTIVE_MONTHS.min(months.len()));
    let active_total: f64 = active.iter().map(|m| m.total_earnings).sum();
    let passive_total: f64 = passive.iter().map(|m| m.total_earnings).sum();
    let grand_total = active_total + passive_total;
    let total_clients_acquired: u64 = active.iter().map(|m| u64::from(m.new_clients)).sum();

    let average_cost_per_acquisition = if total_clients_acquired > 0 {
        active_total / total_clients_acquired as f64
    } else {
        0.0
    };

    // Averages spread earnings over the months actually worked.
    let worked = ACTIVE_MONTHS as f64;
    Aggregates {
        active_total,
        passive_total,
        grand_total,
        total_clients_acquired,
        average_cost_per_acquisition,
        active_monthly_average: active_total / worked,
        passive_monthly_average: passive_total / worked,
        average_monthly_earnings: grand_total / worked,
    }
}

fn retained_clients(original_count: u32, retention_rate: f64) -> u64 {
    // f64::round is half-away-from-zero.
    (f64::from(original_count) * retention_rate).round() as u64
}

fn portfolio_commission(portfolio_size: u64, config: &CompensationConfig) -> f64 {
    portfolio_size as f64 * config.avg_order_value * config.portfolio_commission_rate
}

fn month_index(month: usize) -> u32 {
    month as u32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::presets::{PlanVariant, ScenarioKind};
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn standard_tiers() -> TierTable {
        PlanVariant::Standard.tier_table().expect("valid preset")
    }

    fn standard_config() -> CompensationConfig {
        CompensationConfig {
            fixed_salary: 25_000.0,
            avg_order_value: 2_000.0,
            retention_rate: 0.5,
            portfolio_commission_rate: 0.05,
        }
    }

    fn labels() -> Vec<String> {
        (1..=6).map(|m| format!("partner {m}")).collect()
    }

    fn ledger_for(schedule: &[u32], config: &CompensationConfig) -> Ledger {
        build_ledger(schedule, &labels(), &standard_tiers(), config).expect("valid inputs")
    }

    #[test]
    fn oracle_realistic_standard_ledger_matches_hand_calculation() {
        let scenario = ScenarioKind::Realistic.scenario();
        let ledger = build_ledger(
            &scenario.schedule,
            &scenario.partner_labels,
            &standard_tiers(),
            &standard_config(),
        )
        .expect("valid inputs");

        // Month 1: 50 clients at 11 % = 50*2000*0.11 = 11000, no portfolio yet.
        // Month 2: 100 clients at 12 % = 24000, portfolio round(50*0.5) = 25 -> 2500.
        let expected = [
            (50, "21–50", 11.0, 11_000.0, 0, 0.0, 36_000.0),
            (100, "51–100", 12.0, 24_000.0, 25, 2_500.0, 51_500.0),
            (200, "101–200", 13.0, 52_000.0, 75, 7_500.0, 84_500.0),
            (300, "201–400", 14.0, 84_000.0, 175, 17_500.0, 126_500.0),
            (400, "201–400", 14.0, 112_000.0, 325, 32_500.0, 169_500.0),
            (500, "400+", 15.0, 150_000.0, 525, 52_500.0, 227_500.0),
        ];
        assert_eq!(ledger.months.len(), 12);
        for (row, (clients, label, percent, commission, portfolio, portfolio_pay, total)) in
            ledger.months.iter().zip(expected)
        {
            assert_eq!(row.new_clients, clients);
            assert_eq!(row.tier_label.as_deref(), Some(label));
            assert_approx(row.tier_percent, percent);
            assert_approx(row.new_client_commission, commission);
            assert_eq!(row.portfolio_size, portfolio);
            assert_approx(row.portfolio_commission, portfolio_pay);
            assert_approx(row.fixed_salary, 25_000.0);
            assert_approx(row.total_earnings, total);
            assert!(row.is_active_month);
        }
        assert_eq!(
            ledger.months[0].partner_label.as_deref(),
            Some(scenario.partner_labels[0].as_str())
        );

        let passive = [
            (750, 75_000.0),
            (700, 70_000.0),
            (600, 60_000.0),
            (450, 45_000.0),
            (250, 25_000.0),
            (0, 0.0),
        ];
        for (row, (portfolio, total)) in ledger.months[6..].iter().zip(passive) {
            assert_eq!(row.portfolio_size, portfolio);
            assert_approx(row.total_earnings, total);
        }

        let agg = &ledger.aggregates;
        assert_approx(agg.active_total, 695_500.0);
        assert_approx(agg.passive_total, 275_000.0);
        assert_approx(agg.grand_total, 970_500.0);
        assert_eq!(agg.total_clients_acquired, 1_550);
        assert_approx(agg.average_cost_per_acquisition, 695_500.0 / 1_550.0);
        assert_approx(agg.active_monthly_average, 695_500.0 / 6.0);
        assert_approx(agg.passive_monthly_average, 275_000.0 / 6.0);
        assert_approx(agg.average_monthly_earnings, 161_750.0);
    }

    #[test]
    fn oracle_steep_variant_first_two_months() {
        let scenario = ScenarioKind::Realistic.scenario();
        let variant = PlanVariant::Steep;
        let ledger = build_ledger(
            &scenario.schedule,
            &scenario.partner_labels,
            &variant.tier_table().expect("valid preset"),
            &variant.config(),
        )
        .expect("valid inputs");

        // 50 * 2000 * 0.12 = 12000; 100 * 2000 * 0.15 = 30000; 25 * 2000 * 0.02 = 1000.
        assert_approx(ledger.months[0].total_earnings, 37_000.0);
        assert_approx(ledger.months[1].new_client_commission, 30_000.0);
        assert_approx(ledger.months[1].portfolio_commission, 1_000.0);
        assert_approx(ledger.months[1].total_earnings, 56_000.0);
    }

    #[test]
    fn single_cohort_contributes_for_exactly_five_trailing_months() {
        let ledger = ledger_for(&[10, 0, 0, 0, 0, 0], &standard_config());
        let sizes: Vec<u64> = ledger.months.iter().map(|m| m.portfolio_size).collect();
        assert_eq!(sizes, vec![0, 5, 5, 5, 5, 5, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn cohort_window_reports_contributing_origin_months() {
        let ledger = ledger_for(&[10, 10, 10, 10, 10, 10], &standard_config());
        let windows: Vec<Option<(u32, u32)>> = ledger
            .months
            .iter()
            .map(|m| m.cohort_window.map(|w| (w.first_month, w.last_month)))
            .collect();
        assert_eq!(
            windows,
            vec![
                None,
                Some((1, 1)),
                Some((1, 2)),
                Some((1, 3)),
                Some((1, 4)),
                Some((1, 5)),
                Some((2, 6)),
                Some((3, 6)),
                Some((4, 6)),
                Some((5, 6)),
                Some((6, 6)),
                None,
            ]
        );
    }

    #[test]
    fn retained_count_rounds_half_away_from_zero() {
        assert_eq!(retained_clients(25, 0.5), 13);
        assert_eq!(retained_clients(3, 0.5), 2);
        assert_eq!(retained_clients(1, 0.5), 1);
        assert_eq!(retained_clients(10, 0.34), 3);
        assert_eq!(retained_clients(0, 0.5), 0);

        let ledger = ledger_for(&[25, 0, 0, 0, 0, 0], &standard_config());
        assert_eq!(ledger.months[1].portfolio_size, 13);
    }

    #[test]
    fn zero_acquisition_pays_only_salary_and_has_zero_cpa() {
        let config = standard_config();
        let ledger = ledger_for(&[0; 6], &config);
        let agg = &ledger.aggregates;

        assert_eq!(agg.total_clients_acquired, 0);
        assert_eq!(agg.average_cost_per_acquisition, 0.0);
        assert!(agg.average_cost_per_acquisition.is_finite());
        assert_approx(agg.active_total, 6.0 * config.fixed_salary);
        assert_approx(agg.passive_total, 0.0);
        for row in &ledger.months[..6] {
            assert_eq!(row.tier_label.as_deref(), Some("0–20"));
            assert_approx(row.new_client_commission, 0.0);
        }
    }

    #[test]
    fn passive_months_carry_no_salary_tier_or_partner() {
        let ledger = ledger_for(&[100, 100, 100, 100, 100, 100], &standard_config());
        for (idx, row) in ledger.months.iter().enumerate().skip(6) {
            assert_eq!(row.month_index, idx as u32 + 1);
            assert!(!row.is_active_month);
            assert_eq!(row.new_clients, 0);
            assert_eq!(row.tier_label, None);
            assert_eq!(row.partner_label, None);
            assert_approx(row.tier_percent, 0.0);
            assert_approx(row.fixed_salary, 0.0);
            assert_approx(row.total_earnings, row.portfolio_commission);
        }
    }

    #[test]
    fn build_ledger_rejects_wrong_schedule_length() {
        let err = build_ledger(&[1, 2, 3, 4, 5], &labels(), &standard_tiers(), &standard_config())
            .expect_err("five months must be rejected");
        assert!(matches!(
            err,
            CompensationError::InvalidScheduleLength {
                field: "schedule",
                expected: 6,
                actual: 5
            }
        ));

        let err = build_ledger(&[1; 7], &labels(), &standard_tiers(), &standard_config())
            .expect_err("seven months must be rejected");
        assert!(err.to_string().contains("schedule"));
    }

    #[test]
    fn build_ledger_rejects_wrong_partner_label_count() {
        let short = vec!["only one"];
        let err = build_ledger(&[1; 6], &short, &standard_tiers(), &standard_config())
            .expect_err("label count must match");
        assert!(matches!(
            err,
            CompensationError::InvalidScheduleLength {
                field: "partner labels",
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn resolve_tier_respects_band_edges() {
        let tiers = standard_tiers();
        for (count, label) in [
            (0, "0–20"),
            (20, "0–20"),
            (21, "21–50"),
            (50, "21–50"),
            (51, "51–100"),
            (200, "101–200"),
            (400, "201–400"),
            (401, "400+"),
            (u32::MAX, "400+"),
        ] {
            assert_eq!(resolve_tier(&tiers, count).label, label, "count {count}");
        }
    }

    #[test]
    fn tier_value_summary_adds_trailing_portfolio_value() {
        let values = tier_value_summary(&standard_tiers(), &standard_config());
        assert_eq!(values.len(), 6);
        // 2000 * 10 % = 200; 5 * 2000 * 0.5 * 0.05 = 250.
        assert_approx(values[0].acquisition_commission, 200.0);
        assert_approx(values[0].portfolio_commission, 250.0);
        assert_approx(values[0].lifetime_value, 450.0);
        assert_approx(values[5].lifetime_value, 300.0 + 250.0);
        assert_eq!(values[5].label, "400+");
    }

    #[test]
    fn repeated_builds_are_identical() {
        for kind in ScenarioKind::ALL {
            let scenario = kind.scenario();
            let build = || {
                build_ledger(
                    &scenario.schedule,
                    &scenario.partner_labels,
                    &standard_tiers(),
                    &standard_config(),
                )
                .expect("valid inputs")
            };
            let (a, b) = (build(), build());
            assert_eq!(a, b);
            assert_eq!(
                a.aggregates.grand_total.to_bits(),
                b.aggregates.grand_total.to_bits()
            );
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_tier_percent_never_decreases_with_volume(
            low in 0u32..5_000,
            delta in 0u32..5_000,
        ) {
            for variant in PlanVariant::ALL {
                let tiers = variant.tier_table().expect("valid preset");
                let high = low + delta;
                prop_assert!(
                    resolve_tier(&tiers, low).percent <= resolve_tier(&tiers, high).percent
                );
            }
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_ledger_identities_hold_for_any_schedule(
            schedule in proptest::array::uniform6(0u32..2_000),
            retention_pct in 0u32..=100,
            portfolio_bp in 0u32..1_000,
            salary in 0u32..100_000,
        ) {
            let config = CompensationConfig {
                fixed_salary: salary as f64,
                avg_order_value: 2_000.0,
                retention_rate: retention_pct as f64 / 100.0,
                portfolio_commission_rate: portfolio_bp as f64 / 10_000.0,
            };
            let ledger = ledger_for(&schedule, &config);
            let agg = &ledger.aggregates;

            prop_assert_eq!(agg.active_total + agg.passive_total, agg.grand_total);
            prop_assert_eq!(
                agg.total_clients_acquired,
                schedule.iter().map(|&c| u64::from(c)).sum::<u64>()
            );
            prop_assert!(agg.average_cost_per_acquisition.is_finite());

            let retained: Vec<u64> = schedule
                .iter()
                .map(|&c| (c as f64 * config.retention_rate).round() as u64)
                .collect();
            for (month, row) in ledger.months.iter().enumerate() {
                let expected: u64 = retained
                    .iter()
                    .enumerate()
                    .filter(|&(origin, _)| month > origin && month - origin <= 5)
                    .map(|(_, &r)| r)
                    .sum();
                prop_assert_eq!(row.portfolio_size, expected);
                prop_assert_eq!(row.month_index as usize, month + 1);
                prop_assert!(row.total_earnings >= row.portfolio_commission);
            }
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(24))]

        #[test]
        fn prop_build_ledger_is_idempotent(
            schedule in proptest::array::uniform6(0u32..5_000),
        ) {
            let config = standard_config();
            let first = ledger_for(&schedule, &config);
            let second = ledger_for(&schedule, &config);
            prop_assert_eq!(first, second);
        }
    }
}

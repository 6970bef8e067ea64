use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::config::{CompensationOverrides, PlanSettings, Settings};
use crate::core::{
    CompensationConfig, Ledger, PARTNER_TYPES, PartnerType, PlanVariant, Scenario, ScenarioKind,
    TierTable, TierValue,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliScenario {
    Conservative,
    Realistic,
    Optimistic,
}

impl From<CliScenario> for ScenarioKind {
    fn from(value: CliScenario) -> Self {
        match value {
            CliScenario::Conservative => ScenarioKind::Conservative,
            CliScenario::Realistic => ScenarioKind::Realistic,
            CliScenario::Optimistic => ScenarioKind::Optimistic,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliVariant {
    Standard,
    Steep,
}

impl From<CliVariant> for PlanVariant {
    fn from(value: CliVariant) -> Self {
        match value {
            CliVariant::Standard => PlanVariant::Standard,
            CliVariant::Steep => PlanVariant::Steep,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "commission",
    about = "Twelve-month sales compensation projection (tiered acquisition + trailing portfolio commission)"
)]
struct Cli {
    #[arg(long, help = "TOML settings file layered under the flags below")]
    config: Option<PathBuf>,
    #[arg(long, value_enum, help = "Commission plan variant [default: standard]")]
    variant: Option<CliVariant>,
    #[arg(long, value_enum, help = "Predefined acquisition scenario [default: realistic]")]
    scenario: Option<CliScenario>,
    #[arg(
        long,
        value_delimiter = ',',
        help = "Custom new-client schedule for the six active months, e.g. 10,20,30,40,50,60"
    )]
    schedule: Option<Vec<u32>>,
    #[arg(long, help = "Monthly fixed salary during the active months")]
    fixed_salary: Option<f64>,
    #[arg(long, help = "Average monthly order value per client")]
    avg_order_value: Option<f64>,
    #[arg(long, help = "Share of each cohort retained after acquisition in percent")]
    retention_rate: Option<f64>,
    #[arg(long, help = "Portfolio commission on retained clients' orders in percent")]
    portfolio_commission_rate: Option<f64>,
    #[arg(long, help = "Pretty-print the JSON output")]
    pretty: bool,
}

impl Cli {
    fn overrides(&self) -> PlanSettings {
        PlanSettings {
            variant: self.variant.map(Into::into),
            scenario: self.scenario.map(Into::into),
            compensation: CompensationOverrides {
                fixed_salary: self.fixed_salary,
                avg_order_value: self.avg_order_value,
                retention_rate: self.retention_rate,
                portfolio_commission_rate: self.portfolio_commission_rate,
            },
            tiers: None,
        }
    }
}

/// A schedule given either as a JSON array or as comma-separated text (query strings).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ScheduleInput {
    Months(Vec<u32>),
    Csv(String),
}

/// Partner labels given either as a JSON array or as comma-separated text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum LabelsInput {
    List(Vec<String>),
    Csv(String),
}

impl LabelsInput {
    fn into_labels(self) -> Vec<String> {
        match self {
            LabelsInput::List(labels) => labels,
            LabelsInput::Csv(raw) => raw.split(',').map(|part| part.trim().to_string()).collect(),
        }
    }
}

impl ScheduleInput {
    fn into_months(self) -> Result<Vec<u32>, String> {
        match self {
            ScheduleInput::Months(months) => Ok(months),
            ScheduleInput::Csv(raw) => raw
                .split(',')
                .map(|part| {
                    let part = part.trim();
                    part.parse::<u32>()
                        .map_err(|_| format!("schedule entry '{part}' is not a client count"))
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectionPayload {
    scenario: Option<String>,
    variant: Option<String>,
    schedule: Option<ScheduleInput>,
    partner_labels: Option<LabelsInput>,
    fixed_salary: Option<f64>,
    avg_order_value: Option<f64>,
    retention_rate: Option<f64>,
    portfolio_commission_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TiersQuery {
    variant: Option<String>,
}

#[derive(Debug)]
struct ProjectionRequest {
    settings: Settings,
    schedule: Option<Vec<u32>>,
    partner_labels: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioSummary {
    kind: ScenarioKind,
    name: &'static str,
    description: &'static str,
    custom_schedule: bool,
}

/// Plan constants in the units requests take them in, so a response's config
/// can be sent back unchanged.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigSummary {
    fixed_salary: f64,
    avg_order_value: f64,
    /// Percent.
    retention_rate: f64,
    /// Percent.
    portfolio_commission_rate: f64,
}

impl From<CompensationConfig> for ConfigSummary {
    fn from(config: CompensationConfig) -> Self {
        Self {
            fixed_salary: config.fixed_salary,
            avg_order_value: config.avg_order_value,
            retention_rate: config.retention_rate * 100.0,
            portfolio_commission_rate: config.portfolio_commission_rate * 100.0,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionResponse {
    scenario: ScenarioSummary,
    variant: PlanVariant,
    config: ConfigSummary,
    schedule: Vec<u32>,
    ledger: Ledger,
    tier_values: Vec<TierValue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenariosResponse {
    scenarios: Vec<Scenario>,
    partner_types: &'static [PartnerType],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TiersResponse {
    variant: PlanVariant,
    tiers: TierTable,
    tier_values: Vec<TierValue>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Settings every request is layered over, validated once at startup.
#[derive(Debug, Clone)]
struct AppState {
    base: Arc<PlanSettings>,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Bad flags, or a request for help or version text. `clap::Error::exit`
    /// prints it and picks the exit code.
    #[error(transparent)]
    Usage(#[from] clap::Error),
    #[error("{0}")]
    Projection(String),
}

/// Parses command-line arguments, runs one projection and returns it as JSON.
pub fn run_cli<I, T>(args: I) -> Result<String, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;
    let request = projection_request_from_cli(&cli).map_err(CliError::Projection)?;
    let response = build_projection_response(request).map_err(CliError::Projection)?;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&response)
    } else {
        serde_json::to_string(&response)
    };
    json.map_err(|e| CliError::Projection(format!("failed to serialize projection: {e}")))
}

fn projection_request_from_cli(cli: &Cli) -> Result<ProjectionRequest, String> {
    let base = match &cli.config {
        Some(path) => PlanSettings::load(path).map_err(|e| e.to_string())?,
        None => PlanSettings::default(),
    };
    let settings = base
        .overlay(cli.overrides())
        .resolve()
        .map_err(|e| e.to_string())?;

    Ok(ProjectionRequest {
        settings,
        schedule: cli.schedule.clone(),
        partner_labels: None,
    })
}

pub async fn run_http_server(port: u16, base: PlanSettings) -> std::io::Result<()> {
    // Fail at startup rather than on the first request.
    base.resolve()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(AppState {
        base: Arc::new(base),
    });

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "compensation API listening");
    info!("local access: http://127.0.0.1:{port}/api/projection");

    axum::serve(listener, app).await
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/projection",
            get(projection_get_handler).post(projection_post_handler),
        )
        .route("/api/scenarios", get(scenarios_handler))
        .route("/api/tiers", get(tiers_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn projection_get_handler(
    State(state): State<AppState>,
    Query(payload): Query<ProjectionPayload>,
) -> Response {
    projection_handler_impl(&state, payload)
}

async fn projection_post_handler(
    State(state): State<AppState>,
    Json(payload): Json<ProjectionPayload>,
) -> Response {
    projection_handler_impl(&state, payload)
}

fn projection_handler_impl(state: &AppState, payload: ProjectionPayload) -> Response {
    let request = match projection_request_from_payload(&state.base, payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    debug!(
        scenario = ?request.settings.scenario,
        variant = ?request.settings.plan.variant,
        custom_schedule = request.schedule.is_some(),
        "projection requested"
    );

    match build_projection_response(request) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn scenarios_handler() -> Response {
    json_response(
        StatusCode::OK,
        ScenariosResponse {
            scenarios: ScenarioKind::ALL.iter().map(|kind| kind.scenario()).collect(),
            partner_types: &PARTNER_TYPES,
        },
    )
}

async fn tiers_handler(
    State(state): State<AppState>,
    Query(query): Query<TiersQuery>,
) -> Response {
    match tiers_response(&state.base, query) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn tiers_response(base: &PlanSettings, query: TiersQuery) -> Result<TiersResponse, String> {
    let mut layer = PlanSettings::default();
    if let Some(name) = query.variant {
        layer.variant = Some(PlanVariant::from_name(&name).map_err(|e| e.to_string())?);
    }
    let plan = base
        .clone()
        .overlay(layer)
        .resolve()
        .map_err(|e| e.to_string())?
        .plan;

    Ok(TiersResponse {
        variant: plan.variant,
        tier_values: plan.tier_values(),
        tiers: plan.tiers,
    })
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn projection_request_from_json(
    base: &PlanSettings,
    json: &str,
) -> Result<ProjectionRequest, String> {
    let payload = serde_json::from_str::<ProjectionPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    projection_request_from_payload(base, payload)
}

fn projection_request_from_payload(
    base: &PlanSettings,
    payload: ProjectionPayload,
) -> Result<ProjectionRequest, String> {
    let mut layer = PlanSettings::default();

    if let Some(name) = payload.scenario {
        layer.scenario = Some(ScenarioKind::from_name(&name).map_err(|e| e.to_string())?);
    }
    if let Some(name) = payload.variant {
        layer.variant = Some(PlanVariant::from_name(&name).map_err(|e| e.to_string())?);
    }
    layer.compensation = CompensationOverrides {
        fixed_salary: payload.fixed_salary,
        avg_order_value: payload.avg_order_value,
        retention_rate: payload.retention_rate,
        portfolio_commission_rate: payload.portfolio_commission_rate,
    };

    let settings = base
        .clone()
        .overlay(layer)
        .resolve()
        .map_err(|e| e.to_string())?;
    let schedule = payload.schedule.map(ScheduleInput::into_months).transpose()?;

    Ok(ProjectionRequest {
        settings,
        schedule,
        partner_labels: payload.partner_labels.map(LabelsInput::into_labels),
    })
}

fn build_projection_response(request: ProjectionRequest) -> Result<ProjectionResponse, String> {
    let ProjectionRequest {
        settings,
        schedule,
        partner_labels,
    } = request;
    let scenario = settings.scenario.scenario();
    let plan = &settings.plan;

    let custom_schedule = schedule.is_some();
    let schedule = schedule.unwrap_or_else(|| scenario.schedule.clone());
    let partner_labels = partner_labels.unwrap_or_else(|| scenario.partner_labels.clone());
    let ledger = plan
        .project(&schedule, &partner_labels)
        .map_err(|e| e.to_string())?;

    Ok(ProjectionResponse {
        scenario: ScenarioSummary {
            kind: scenario.kind,
            name: scenario.name,
            description: scenario.description,
            custom_schedule,
        },
        variant: plan.variant,
        config: plan.config.into(),
        schedule,
        ledger,
        tier_values: plan.tier_values(),
    })
}

use std::env;
use std::path::Path;

use commission::api::CliError;
use commission::config::PlanSettings;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let raw_args: Vec<String> = env::args().collect();
    if raw_args.get(1).map(|s| s.as_str()) == Some("serve") {
        let port = raw_args
            .get(2)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);
        let base = match raw_args.get(3) {
            Some(path) => match PlanSettings::load(Path::new(path)) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::error!(error = %e, "invalid settings file");
                    std::process::exit(1);
                }
            },
            None => PlanSettings::default(),
        };
        if let Err(e) = commission::api::run_http_server(port, base).await {
            tracing::error!(error = %e, "server error");
            std::process::exit(1);
        }
        return;
    }

    match commission::api::run_cli(raw_args) {
        Ok(json) => println!("{json}"),
        Err(CliError::Usage(e)) => e.exit(),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

use clap::Parser;
use regions_map::app;
use regions_map::config::AppConfig;
use regions_map::data::HttpTransport;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Builds the interactive map of the French regions (index.html).
/// Every parameter is fixed; the command takes no options.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let _cli = Cli::parse();
    let config = AppConfig::default();

    let result = match HttpTransport::new(config.source.timeout) {
        Ok(transport) => app::run(&config, &transport).await,
        Err(err) => Err(err),
    };
    ExitCode::from(app::report(&result))
}

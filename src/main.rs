use clap::Parser;
use tracker::app;
use tracker::config::Config;

/// Main entry point for the academic monitoring web application
///
/// Reads configuration from flags and the environment, connects to the
/// configured spreadsheet (or in-memory tables) and serves the form.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    let controller = config.controller().await?;
    let state = app::AppState::new(controller)?;

    app::run(&config.bind, state).await
}

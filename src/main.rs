mod comparison;
mod config;
mod db;
mod error;
mod http;
mod models;
mod processor;
mod session;
mod track;

use config::AppConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .init();

    info!("Starting GPX workout summary service...");

    // Init DB
    let pool = db::init_pool(&config.database_path).await?;
    info!("Connected to calibration database");

    let state = http::AppState {
        registry: session::SessionRegistry::new(),
        store: db::CalibrationStore::new(pool),
        provider: track::GpxSummarizer,
    };

    // Start serving
    let app = http::router(state, &config);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

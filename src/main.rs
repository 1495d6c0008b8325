//! SmartCampus - utility monitoring for campus buildings.
//!
//! # API Endpoints
//!
//! - `GET|POST /buildings`, `GET /buildings/{id}` - Building registry
//! - `GET|POST /readings`, `GET|DELETE /readings/{id}` - Readings (POST runs anomaly detection)
//! - `POST /iot/ingest` - Device ingestion, guarded by `X-API-Key`
//! - `POST /admin/import-readings` - Bulk import
//! - `GET /alerts`, `GET /alerts/{id}` - Alerts
//! - `PUT /alerts/{id}/acknowledge`, `PUT /alerts/{id}/resolve` - Alert lifecycle
//! - `GET|POST /alerts/rules`, `PUT|DELETE /alerts/rules/{id}` - Alert rule configuration
//! - `GET /health` - Health check

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use smartcampus::api::{AppState, router};
use smartcampus::config::Config;
use smartcampus::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("smartcampus=info".parse()?))
        .init();

    info!(port = config.port, db_url = %config.database_url, "Starting SmartCampus server");

    // Initialize storage
    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    if config.iot_api_key.is_none() {
        warn!("No IoT API key configured; /iot/ingest will refuse requests");
    }

    let state = AppState {
        storage,
        iot_api_key: config.iot_api_key.clone(),
    };
    let app = router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "SmartCampus is listening");

    axum::serve(listener, app).await?;

    Ok(())
}

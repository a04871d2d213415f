use anyhow::{Context, Result};
use listing_warehouse::analytics::report::ReportTarget;
use listing_warehouse::api::{router, AppState};
use listing_warehouse::config::Config;
use listing_warehouse::storage::LocalObjectStore;
use listing_warehouse::warehouse::PgWarehouse;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("🏠 Starting Listing API server...");

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;

    info!("📦 Connecting to database...");
    let warehouse = PgWarehouse::connect(
        &config.database_url,
        &config.dataset_id,
        config.db_max_connections,
    )
    .await
    .context("Failed to connect to database")?;
    warehouse.ensure_schema().await?;
    info!("✅ Database connected successfully");

    let state = AppState {
        warehouse: Arc::new(warehouse),
        store: Arc::new(LocalObjectStore::new(config.storage_root.clone())),
        target: Arc::new(ReportTarget::from(&config)),
        write_mode: config.dimension_write_mode,
    };

    let app = router(state);

    info!("🚀 Server running on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Listing ETL runner - load CSV files or URLs into the warehouse

use anyhow::{bail, Result};
use listing_warehouse::analytics::report::{generate_report, ReportTarget};
use listing_warehouse::analytics::ReportQueries;
use listing_warehouse::config::Config;
use listing_warehouse::ingestion::batch::process_source;
use listing_warehouse::storage::LocalObjectStore;
use listing_warehouse::warehouse::{MemoryWarehouse, PgWarehouse, Warehouse};
use std::env;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    sources: Vec<String>,
    report: bool,
    dry_run: bool,
}

impl Args {
    fn parse(args: impl Iterator<Item = String>) -> Self {
        let mut parsed = Args::default();
        for arg in args {
            match arg.as_str() {
                "--report" => parsed.report = true,
                "--dry-run" => parsed.dry_run = true,
                _ => parsed.sources.push(arg),
            }
        }
        parsed
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse(env::args().skip(1));
    if args.sources.is_empty() && !args.report {
        bail!("usage: listing-etl [--dry-run] [--report] <csv path or url>...");
    }

    info!("Starting listing ETL");
    let config = Config::from_env()?;
    info!("Configuration loaded");

    if args.dry_run {
        warn!("Dry run: loading into an in-memory warehouse");
        run(&MemoryWarehouse::new(), &config, &args).await
    } else {
        let warehouse = PgWarehouse::connect(
            &config.database_url,
            &config.dataset_id,
            config.db_max_connections,
        )
        .await?;
        warehouse.ensure_schema().await?;
        run(&warehouse, &config, &args).await
    }
}

async fn run<W: Warehouse + ReportQueries>(
    warehouse: &W,
    config: &Config,
    args: &Args,
) -> Result<()> {
    let mut failures = 0;

    for source in &args.sources {
        info!("Running ingestion for: {}", source);

        match process_source(warehouse, source, config.dimension_write_mode).await {
            Ok(summary) => {
                info!("✓ {} completed: {}", source, summary);
                info!("  {}", summary.normalize);
            }
            Err(e) => {
                error!("✗ {} failed: {}", source, e);
                failures += 1;
            }
        }
    }

    if args.report {
        let store = LocalObjectStore::new(config.storage_root.clone());
        let outcome = generate_report(warehouse, &store, &ReportTarget::from(config)).await?;
        info!("✓ Report generated: {}", outcome.html_report);
        info!("  Data: {}", outcome.json_report);
    }

    info!("Listing ETL complete");

    if failures > 0 {
        bail!("{} of {} sources failed", failures, args.sources.len());
    }
    Ok(())
}

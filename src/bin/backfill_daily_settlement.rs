use std::env;

use sea_orm::Database;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settlement_backend::config::AppConfig;
use settlement_backend::models::settlement::parse_date;
use settlement_backend::services::formula::FormulaService;
use settlement_backend::services::percentile::PercentileCalculator;
use settlement_backend::services::settlement_result::SettlementResultService;
use settlement_backend::services::settlement_task::SettlementPipeline;
use settlement_backend::store::{PgStore, Stores};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,settlement_backend=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: cargo run --bin backfill_daily_settlement <start_date> [end_date]");
        eprintln!("Example: cargo run --bin backfill_daily_settlement 2025-03-01 2025-03-07");
        std::process::exit(1);
    }

    let start = parse_date("start_date", &args[1])?;
    let end = match args.get(2) {
        Some(raw) => parse_date("end_date", raw)?,
        None => start,
    };
    if end < start {
        eprintln!("end_date must not be before start_date");
        std::process::exit(1);
    }

    let config = AppConfig::from_env()?;
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;

    // The scheduler's queue is bypassed; days run inline, oldest first
    let stores = Stores::postgres(PgStore::new(db));
    let percentile = PercentileCalculator::new(
        stores.samples.clone(),
        stores.schools.clone(),
        stores.daily.clone(),
        config.sample_interval_secs,
        config.school_page_size,
    );
    let results = SettlementResultService::new(
        stores.daily.clone(),
        stores.results.clone(),
        FormulaService::new(stores.formulas.clone()),
        config.unit_base,
    );
    let pipeline = SettlementPipeline::new(percentile, results);

    tracing::info!(%start, %end, "Starting daily settlement backfill");
    match pipeline.run(start, end).await {
        Ok(written) => {
            tracing::info!(%start, %end, written, "Daily settlement backfill completed");
            Ok(())
        }
        Err(e) => {
            tracing::error!(%start, %end, error = %e, "Daily settlement backfill failed");
            Err(e.into())
        }
    }
}

use std::sync::Arc;

use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use settlement_backend::{
    build_router,
    config::AppConfig,
    jobs::settlement_scheduler::{start_settlement_scheduler, SettlementScheduler, SystemClock},
    store::{PgStore, Stores},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,settlement_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Connect to database
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let state = AppState::new(Stores::postgres(PgStore::new(db)), config.clone());

    if config.scheduler_enabled {
        let scheduler = SettlementScheduler::new(
            state.schedule.clone(),
            state.tasks.clone(),
            Arc::new(SystemClock),
        );
        start_settlement_scheduler(scheduler, config.tick_secs).await;
    } else {
        tracing::warn!("Settlement scheduler disabled by configuration");
    }

    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .expect("Failed to bind address");

    tracing::info!(
        "Server listening on {}",
        listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| config.bind_address.clone())
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");
}

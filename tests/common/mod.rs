#![allow(dead_code)]

use std::env;
use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response, Router};
use chrono::{NaiveDate, NaiveDateTime};
use http_body_util::BodyExt;
use lazy_static::lazy_static;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::Value;
use settlement_backend::{
    build_router,
    config::AppConfig,
    store::{memory::SampleSeed, MemoryStore, Stores},
    AppState,
};
use tower::ServiceExt;

lazy_static! {
    /// Serializes migration runs across concurrently running tests
    static ref MIGRATE_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::new(());
}

pub const REGION: &str = "east";
pub const CP: &str = "telecom";

/// In-memory store plus the state wired over it
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
}

/// An 8 s sample interval makes a sample's metric equal to its byte count
pub fn test_config() -> AppConfig {
    AppConfig {
        sample_interval_secs: 8,
        workers: 1,
        queue_size: 8,
        rate_sync_page_size: 2,
        school_page_size: 2,
        scheduler_enabled: false,
        ..AppConfig::default()
    }
}

pub fn setup_test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(Stores::memory(store.clone()), test_config());
    TestApp { store, state }
}

impl TestApp {
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Register a school and give it `values` (bits/s) as samples on `date`
    pub fn seed_day(&self, school_id: &str, school_name: &str, date: NaiveDate, values: &[i64]) {
        self.store.add_school(school_id, school_name, REGION, CP);
        for (i, value) in values.iter().enumerate() {
            self.store.add_sample(SampleSeed {
                school_id,
                school_name,
                region: REGION,
                cp: CP,
                at: at(date, (i as u32) * 5),
                bytes_received: *value,
                bytes_sent: 0,
            });
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `minutes` past midnight on `date`
pub fn at(date: NaiveDate, minutes: u32) -> NaiveDateTime {
    date.and_hms_opt(minutes / 60, minutes % 60, 0).unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Set up test database connection with migrations applied.
/// Uses TEST_DATABASE_URL; `None` when it is not set.
pub async fn setup_test_db() -> Option<DatabaseConnection> {
    let database_url = env::var("TEST_DATABASE_URL").ok()?;
    let db = Database::connect(&database_url)
        .await
        .expect("Test database connection should succeed");

    let _guard = MIGRATE_LOCK.lock().await;
    Migrator::up(&db, None)
        .await
        .expect("Migrations should apply to the test database");
    Some(db)
}

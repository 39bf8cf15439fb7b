// src/lib.rs

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::AppConfig;
use services::{
    customer_fields::CustomerFieldService,
    customer_rates::CustomerRateService,
    formula::FormulaService,
    percentile::PercentileCalculator,
    rate_sync::RateSyncEngine,
    settlement_config::SettlementConfigService,
    settlement_result::SettlementResultService,
    settlement_task::{SettlementPipeline, TaskQueue},
    sync_rules::SyncRuleService,
};
use store::Stores;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub stores: Stores,
    pub percentile: PercentileCalculator,
    pub results: SettlementResultService,
    pub formulas: FormulaService,
    pub rate_sync: RateSyncEngine,
    pub sync_rules: SyncRuleService,
    pub customer_fields: CustomerFieldService,
    pub customer_rates: CustomerRateService,
    pub schedule: SettlementConfigService,
    pub tasks: TaskQueue,
}

impl AppState {
    /// Wire every service over `stores` and start the task queue workers.
    /// Must be called inside a tokio runtime.
    pub fn new(stores: Stores, config: AppConfig) -> Self {
        let percentile = PercentileCalculator::new(
            stores.samples.clone(),
            stores.schools.clone(),
            stores.daily.clone(),
            config.sample_interval_secs,
            config.school_page_size,
        );
        let formulas = FormulaService::new(stores.formulas.clone());
        let results = SettlementResultService::new(
            stores.daily.clone(),
            stores.results.clone(),
            formulas.clone(),
            config.unit_base,
        );
        let rate_sync = RateSyncEngine::new(
            stores.rules.clone(),
            stores.rates.clone(),
            stores.schools.clone(),
            stores.fields.clone(),
            config.rate_sync_page_size,
        );
        let tasks = TaskQueue::start(
            stores.tasks.clone(),
            SettlementPipeline::new(percentile.clone(), results.clone()),
            config.workers,
            config.queue_size,
        );

        Self {
            sync_rules: SyncRuleService::new(stores.rules.clone()),
            customer_fields: CustomerFieldService::new(stores.fields.clone()),
            customer_rates: CustomerRateService::new(stores.rates.clone()),
            schedule: SettlementConfigService::new(stores.config.clone()),
            percentile,
            results,
            formulas,
            rate_sync,
            tasks,
            stores,
            config,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    use handlers::{formulas, health, rates, schedule, settlement};

    Router::new()
        .route("/health", get(health::health))
        // Settlement
        .route("/api/settlement/daily", get(settlement::list_daily))
        .route(
            "/api/settlement/daily/calculate",
            post(settlement::calculate_daily),
        )
        .route("/api/settlement/results", get(settlement::get_results))
        .route(
            "/api/settlement/results/cached",
            get(settlement::get_cached_results),
        )
        .route(
            "/api/settlement/results/{id}",
            axum::routing::delete(settlement::delete_result),
        )
        .route(
            "/api/settlement/formulas",
            get(formulas::list_formulas).post(formulas::create_formula),
        )
        .route(
            "/api/settlement/formulas/{id}",
            get(formulas::get_formula)
                .put(formulas::update_formula)
                .delete(formulas::delete_formula),
        )
        // Schedule and tasks
        .route(
            "/api/settlement/config",
            get(schedule::get_config).put(schedule::update_config),
        )
        .route("/api/settlement/tasks", get(schedule::list_tasks))
        .route("/api/settlement/tasks/daily", post(schedule::run_daily))
        .route("/api/settlement/tasks/weekly", post(schedule::run_weekly))
        // Rates
        .route(
            "/api/rates/customer",
            get(rates::list_customer_rates).put(rates::upsert_customer_rate),
        )
        .route("/api/rates/sync/execute", post(rates::execute_sync))
        .route(
            "/api/rates/sync-rules",
            get(rates::list_rules).post(rates::create_rule),
        )
        .route(
            "/api/rates/sync-rules/{id}",
            get(rates::get_rule)
                .put(rates::update_rule)
                .delete(rates::delete_rule),
        )
        .route(
            "/api/rates/sync-rules/{id}/enabled",
            put(rates::set_rule_enabled),
        )
        .route(
            "/api/rates/sync-rules/{id}/priority",
            put(rates::update_rule_priority),
        )
        .route(
            "/api/rates/customer-fields",
            get(rates::list_fields).post(rates::create_field),
        )
        .route("/api/schools/regions", get(rates::list_regions))
        .route("/api/schools/cps", get(rates::list_cps))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub mod entities {
    pub mod prelude;
    pub mod rate_customer;
    pub mod rate_customer_field_defs;
    pub mod rate_customer_sync_rules;
    pub mod school;
    pub mod school_settlement;
    pub mod school_traffic;
    pub mod settlement_config;
    pub mod settlement_formulas;
    pub mod settlement_results;
    pub mod settlement_task;
}

pub mod services {
    pub mod customer_fields;
    pub mod customer_rates;
    pub mod formula;
    pub mod percentile;
    pub mod rate_sync;
    pub mod settlement_config;
    pub mod settlement_result;
    pub mod settlement_task;
    pub mod sync_rules;
}

pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod store;

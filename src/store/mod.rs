//! Persistence seams.
//!
//! Every collaborator the settlement core touches is an object-safe async
//! trait, held as `Arc<dyn Trait>`. `postgres` implements them on sea-orm,
//! `memory` keeps everything in process for tests and embedding.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::entities::{
    rate_customer, rate_customer_field_defs, rate_customer_sync_rules, school, school_settlement,
    school_traffic, settlement_config, settlement_formulas, settlement_results, settlement_task,
};
use crate::error::Result;
use crate::models::formula::FormulaInput;
use crate::models::rates::{
    CustomerRateFilter, FieldDefInput, NewRateCustomer, NewSyncRule, RateCustomerPatch, SchoolFilter, SyncRulePatch,
};
use crate::models::schedule::{NewSettlementTask, ScheduleConfig, TaskType, TaskUpdate};
use crate::models::settlement::{
    AggregatedFlow, DailySettlementFilter, NewDailySettlement, SettlementResultFilter,
    SettlementResultUpsert,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait TrafficSampleStore: Send + Sync {
    /// Samples for one school inside `[day_start, day_end]`
    async fn samples(
        &self,
        school_id: &str,
        day_start: NaiveDateTime,
        day_end: NaiveDateTime,
        region: Option<&str>,
        cp: Option<&str>,
    ) -> Result<Vec<school_traffic::Model>>;
}

#[async_trait]
pub trait SchoolDirectory: Send + Sync {
    async fn school(
        &self,
        school_id: &str,
        region: Option<&str>,
        cp: Option<&str>,
    ) -> Result<Option<school::Model>>;

    /// One page of schools ordered by id, with the total match count
    async fn schools(
        &self,
        filter: &SchoolFilter,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<school::Model>, u64)>;

    async fn regions(&self) -> Result<Vec<String>>;

    async fn cps(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait DailySettlementStore: Send + Sync {
    /// Insert or overwrite the row for (region, cp, school_id, date)
    async fn upsert_daily(&self, value: NewDailySettlement) -> Result<school_settlement::Model>;

    async fn list_daily(&self, filter: &DailySettlementFilter)
        -> Result<Vec<school_settlement::Model>>;

    /// Sum daily values per (region, cp, school) and join the current rate row
    async fn aggregate_flows(&self, filter: &DailySettlementFilter) -> Result<Vec<AggregatedFlow>>;
}

#[async_trait]
pub trait RateStore: Send + Sync {
    async fn find_customer_rate(
        &self,
        region: &str,
        cp: &str,
        school_name: &str,
    ) -> Result<Option<rate_customer::Model>>;

    async fn insert_customer_rate(&self, rate: NewRateCustomer) -> Result<rate_customer::Model>;

    async fn update_customer_rate(&self, id: i64, patch: RateCustomerPatch) -> Result<()>;

    /// Page ordered by updated_at desc, with the total match count
    async fn list_customer_rates(
        &self,
        filter: &CustomerRateFilter,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<rate_customer::Model>, u64)>;
}

#[async_trait]
pub trait FormulaStore: Send + Sync {
    async fn list_formulas(&self) -> Result<Vec<settlement_formulas::Model>>;

    async fn formula(&self, id: i64) -> Result<Option<settlement_formulas::Model>>;

    async fn create_formula(&self, input: FormulaInput) -> Result<settlement_formulas::Model>;

    async fn update_formula(
        &self,
        id: i64,
        input: FormulaInput,
    ) -> Result<Option<settlement_formulas::Model>>;

    async fn delete_formula(&self, id: i64) -> Result<bool>;

    /// Most recently updated enabled formula, ties broken by highest id
    async fn default_formula(&self) -> Result<Option<settlement_formulas::Model>>;
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn upsert_results(&self, records: Vec<SettlementResultUpsert>) -> Result<()>;

    /// Page ordered by updated_at desc, amount desc, with the total match count
    async fn list_results(
        &self,
        filter: &SettlementResultFilter,
    ) -> Result<(Vec<settlement_results::Model>, u64)>;

    async fn delete_result(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait SyncRuleStore: Send + Sync {
    /// Enabled rules by ascending priority, most recently updated first on ties
    async fn enabled_rules(&self) -> Result<Vec<rate_customer_sync_rules::Model>>;

    async fn list_rules(&self) -> Result<Vec<rate_customer_sync_rules::Model>>;

    async fn rule(&self, id: i64) -> Result<Option<rate_customer_sync_rules::Model>>;

    async fn create_rule(&self, rule: NewSyncRule) -> Result<rate_customer_sync_rules::Model>;

    async fn update_rule(
        &self,
        id: i64,
        patch: SyncRulePatch,
    ) -> Result<Option<rate_customer_sync_rules::Model>>;

    async fn delete_rule(&self, id: i64) -> Result<bool>;
}

#[async_trait]
pub trait FieldSchemaStore: Send + Sync {
    async fn field_defs(&self) -> Result<Vec<rate_customer_field_defs::Model>>;

    async fn create_field_def(
        &self,
        input: FieldDefInput,
    ) -> Result<rate_customer_field_defs::Model>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn settlement_config(&self) -> Result<Option<settlement_config::Model>>;

    /// Update the singleton row, creating it on first save
    async fn save_settlement_config(
        &self,
        config: ScheduleConfig,
    ) -> Result<settlement_config::Model>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Latest task for (type, task_date)
    async fn find_task(
        &self,
        task_type: TaskType,
        task_date: NaiveDate,
    ) -> Result<Option<settlement_task::Model>>;

    async fn create_task(&self, task: NewSettlementTask) -> Result<settlement_task::Model>;

    async fn update_task(&self, id: i64, update: TaskUpdate) -> Result<()>;

    /// Newest first
    async fn list_tasks(&self, limit: u64) -> Result<Vec<settlement_task::Model>>;
}

/// Every store the service needs, bundled for `AppState`
#[derive(Clone)]
pub struct Stores {
    pub samples: Arc<dyn TrafficSampleStore>,
    pub schools: Arc<dyn SchoolDirectory>,
    pub daily: Arc<dyn DailySettlementStore>,
    pub rates: Arc<dyn RateStore>,
    pub formulas: Arc<dyn FormulaStore>,
    pub results: Arc<dyn ResultStore>,
    pub rules: Arc<dyn SyncRuleStore>,
    pub fields: Arc<dyn FieldSchemaStore>,
    pub config: Arc<dyn ConfigStore>,
    pub tasks: Arc<dyn TaskStore>,
}

impl Stores {
    fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: TrafficSampleStore
            + SchoolDirectory
            + DailySettlementStore
            + RateStore
            + FormulaStore
            + ResultStore
            + SyncRuleStore
            + FieldSchemaStore
            + ConfigStore
            + TaskStore
            + 'static,
    {
        Self {
            samples: store.clone(),
            schools: store.clone(),
            daily: store.clone(),
            rates: store.clone(),
            formulas: store.clone(),
            results: store.clone(),
            rules: store.clone(),
            fields: store.clone(),
            config: store.clone(),
            tasks: store,
        }
    }

    pub fn postgres(store: PgStore) -> Self {
        Self::from_shared(Arc::new(store))
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self::from_shared(store)
    }
}

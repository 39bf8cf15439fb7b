//! sea-orm backed store

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ActiveValue::Unchanged, ColumnTrait, DatabaseBackend,
    DatabaseConnection, DbErr, EntityTrait, FromQueryResult, JsonValue, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Statement, TransactionTrait,
};
use serde_json::json;
use tracing::debug;

use super::{
    ConfigStore, DailySettlementStore, FieldSchemaStore, FormulaStore, RateStore, ResultStore,
    SchoolDirectory, SyncRuleStore, TaskStore, TrafficSampleStore,
};
use crate::entities::{
    prelude::*, rate_customer, rate_customer_field_defs, rate_customer_sync_rules, school,
    school_settlement, school_traffic, settlement_config, settlement_formulas, settlement_results,
    settlement_task,
};
use crate::error::{Result, SettlementError};
use crate::models::formula::FormulaInput;
use crate::models::rates::{
    CustomerRateFilter, FieldDefInput, NewRateCustomer, NewSyncRule, RateCustomerPatch,
    SchoolFilter, SyncRulePatch,
};
use crate::models::schedule::{NewSettlementTask, ScheduleConfig, TaskStatus, TaskType, TaskUpdate};
use crate::models::settlement::{
    AggregatedFlow, DailySettlementFilter, NewDailySettlement, SettlementResultFilter,
    SettlementResultUpsert,
};

#[derive(Clone)]
pub struct PgStore {
    db: DatabaseConnection,
}

impl PgStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Missing rows on update surface as NotFound rather than a database error
fn update_err(what: String) -> impl FnOnce(DbErr) -> SettlementError {
    move |err| match err {
        DbErr::RecordNotUpdated | DbErr::RecordNotFound(_) => SettlementError::not_found(what),
        other => other.into(),
    }
}

#[async_trait]
impl TrafficSampleStore for PgStore {
    async fn samples(
        &self,
        school_id: &str,
        day_start: NaiveDateTime,
        day_end: NaiveDateTime,
        region: Option<&str>,
        cp: Option<&str>,
    ) -> Result<Vec<school_traffic::Model>> {
        let mut query = SchoolTraffic::find()
            .filter(school_traffic::Column::SchoolId.eq(school_id))
            .filter(school_traffic::Column::CreateTime.between(day_start, day_end));
        if let Some(region) = region {
            query = query.filter(school_traffic::Column::Region.eq(region));
        }
        if let Some(cp) = cp {
            query = query.filter(school_traffic::Column::Cp.eq(cp));
        }

        Ok(query
            .order_by(school_traffic::Column::CreateTime, Order::Asc)
            .all(&self.db)
            .await?)
    }
}

#[async_trait]
impl SchoolDirectory for PgStore {
    async fn school(
        &self,
        school_id: &str,
        region: Option<&str>,
        cp: Option<&str>,
    ) -> Result<Option<school::Model>> {
        let mut query = School::find().filter(school::Column::SchoolId.eq(school_id));
        if let Some(region) = region {
            query = query.filter(school::Column::Region.eq(region));
        }
        if let Some(cp) = cp {
            query = query.filter(school::Column::Cp.eq(cp));
        }
        Ok(query
            .order_by(school::Column::Id, Order::Asc)
            .one(&self.db)
            .await?)
    }

    async fn schools(
        &self,
        filter: &SchoolFilter,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<school::Model>, u64)> {
        let mut query = School::find();
        if let Some(region) = &filter.region {
            query = query.filter(school::Column::Region.eq(region.as_str()));
        }
        if let Some(cp) = &filter.cp {
            query = query.filter(school::Column::Cp.eq(cp.as_str()));
        }

        let total = query.clone().count(&self.db).await?;
        let rows = query
            .order_by(school::Column::Id, Order::Asc)
            .limit(limit)
            .offset(offset)
            .all(&self.db)
            .await?;
        Ok((rows, total))
    }

    async fn regions(&self) -> Result<Vec<String>> {
        Ok(School::find()
            .select_only()
            .column(school::Column::Region)
            .distinct()
            .filter(school::Column::Region.ne(""))
            .order_by(school::Column::Region, Order::Asc)
            .into_tuple::<String>()
            .all(&self.db)
            .await?)
    }

    async fn cps(&self) -> Result<Vec<String>> {
        Ok(School::find()
            .select_only()
            .column(school::Column::Cp)
            .distinct()
            .filter(school::Column::Cp.ne(""))
            .order_by(school::Column::Cp, Order::Asc)
            .into_tuple::<String>()
            .all(&self.db)
            .await?)
    }
}

#[derive(Debug, FromQueryResult)]
struct AggregateRow {
    region: String,
    cp: String,
    school_id: String,
    school_name: String,
    day_count: i64,
    total_flow: f64,
    customer_fee: Option<f64>,
    network_line_fee: Option<f64>,
    general_fee: Option<f64>,
    extra: Option<JsonValue>,
}

impl From<AggregateRow> for AggregatedFlow {
    fn from(row: AggregateRow) -> Self {
        let mut flow = AggregatedFlow {
            region: row.region,
            cp: row.cp,
            school_id: row.school_id,
            school_name: row.school_name,
            day_count: row.day_count,
            total_flow: row.total_flow,
            customer_fee: row.customer_fee,
            network_line_fee: row.network_line_fee,
            general_fee: row.general_fee,
            ..Default::default()
        };
        if let Some(extra) = row.extra.as_ref() {
            flow.apply_extra(extra);
        }
        flow
    }
}

fn daily_query(filter: &DailySettlementFilter) -> sea_orm::Select<SchoolSettlement> {
    let mut query = SchoolSettlement::find()
        .filter(school_settlement::Column::SettlementDate.between(filter.start_date, filter.end_date));
    if let Some(region) = &filter.region {
        query = query.filter(school_settlement::Column::Region.eq(region.as_str()));
    }
    if let Some(cp) = &filter.cp {
        query = query.filter(school_settlement::Column::Cp.eq(cp.as_str()));
    }
    if let Some(school_id) = &filter.school_id {
        query = query.filter(school_settlement::Column::SchoolId.eq(school_id.as_str()));
    }
    if let Some(name) = &filter.school_name {
        query = query.filter(school_settlement::Column::SchoolName.contains(name.as_str()));
    }
    query
}

#[async_trait]
impl DailySettlementStore for PgStore {
    async fn upsert_daily(&self, value: NewDailySettlement) -> Result<school_settlement::Model> {
        let stamp = now();
        let model = school_settlement::ActiveModel {
            school_id: Set(value.school_id),
            school_name: Set(value.school_name),
            region: Set(value.region),
            cp: Set(value.cp),
            settlement_value: Set(value.value),
            settlement_time: Set(value.sample_time),
            settlement_date: Set(value.date),
            create_time: Set(stamp),
            update_time: Set(stamp),
            ..Default::default()
        };

        let row = SchoolSettlement::insert(model)
            .on_conflict(
                OnConflict::columns([
                    school_settlement::Column::Region,
                    school_settlement::Column::Cp,
                    school_settlement::Column::SchoolId,
                    school_settlement::Column::SettlementDate,
                ])
                .update_columns([
                    school_settlement::Column::SchoolName,
                    school_settlement::Column::SettlementValue,
                    school_settlement::Column::SettlementTime,
                    school_settlement::Column::UpdateTime,
                ])
                .to_owned(),
            )
            .exec_with_returning(&self.db)
            .await?;
        Ok(row)
    }

    async fn list_daily(
        &self,
        filter: &DailySettlementFilter,
    ) -> Result<Vec<school_settlement::Model>> {
        Ok(daily_query(filter)
            .order_by(school_settlement::Column::SettlementDate, Order::Asc)
            .order_by(school_settlement::Column::SchoolId, Order::Asc)
            .all(&self.db)
            .await?)
    }

    async fn aggregate_flows(&self, filter: &DailySettlementFilter) -> Result<Vec<AggregatedFlow>> {
        let mut values: Vec<sea_orm::Value> =
            vec![filter.start_date.into(), filter.end_date.into()];
        let mut conditions = vec!["s.settlement_date BETWEEN $1 AND $2".to_string()];

        let mut push = |column: &str, op: &str, value: String| {
            values.push(value.into());
            conditions.push(format!("{} {} ${}", column, op, values.len()));
        };
        if let Some(region) = &filter.region {
            push("s.region", "=", region.clone());
        }
        if let Some(cp) = &filter.cp {
            push("s.cp", "=", cp.clone());
        }
        if let Some(school_id) = &filter.school_id {
            push("s.school_id", "=", school_id.clone());
        }
        if let Some(name) = &filter.school_name {
            push("s.school_name", "LIKE", format!("%{}%", name));
        }

        let sql = format!(
            r#"
            SELECT
                s.region,
                s.cp,
                s.school_id,
                s.school_name,
                COUNT(*)::bigint AS day_count,
                COALESCE(SUM(s.settlement_value), 0)::double precision AS total_flow,
                r.customer_fee,
                r.network_line_fee,
                r.general_fee,
                r.extra
            FROM school_settlement s
            LEFT JOIN rate_customer r
                ON r.region = s.region AND r.cp = s.cp AND r.school_name = s.school_name
            WHERE {}
            GROUP BY s.region, s.cp, s.school_id, s.school_name, r.id
            ORDER BY total_flow DESC
            "#,
            conditions.join(" AND ")
        );

        let rows = AggregateRow::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            sql,
            values,
        ))
        .all(&self.db)
        .await?;

        debug!(groups = rows.len(), "Aggregated daily settlement flows");
        Ok(rows.into_iter().map(AggregatedFlow::from).collect())
    }
}

#[async_trait]
impl RateStore for PgStore {
    async fn find_customer_rate(
        &self,
        region: &str,
        cp: &str,
        school_name: &str,
    ) -> Result<Option<rate_customer::Model>> {
        Ok(RateCustomer::find()
            .filter(rate_customer::Column::Region.eq(region))
            .filter(rate_customer::Column::Cp.eq(cp))
            .filter(rate_customer::Column::SchoolName.eq(school_name))
            .one(&self.db)
            .await?)
    }

    async fn insert_customer_rate(&self, rate: NewRateCustomer) -> Result<rate_customer::Model> {
        let stamp = now();
        let extra = if rate.extra.is_null() { json!({}) } else { rate.extra };
        let model = rate_customer::ActiveModel {
            region: Set(rate.region),
            cp: Set(rate.cp),
            school_name: Set(rate.school_name),
            customer_fee: Set(rate.customer_fee),
            network_line_fee: Set(rate.network_line_fee),
            general_fee: Set(rate.general_fee),
            fee_mode: Set(rate.fee_mode.as_str().to_string()),
            extra: Set(extra),
            last_sync_time: Set(rate.last_sync_time),
            last_sync_rule_id: Set(rate.last_sync_rule_id),
            created_at: Set(stamp),
            updated_at: Set(stamp),
            ..Default::default()
        };

        let row = RateCustomer::insert(model)
            .on_conflict(
                OnConflict::columns([
                    rate_customer::Column::Region,
                    rate_customer::Column::Cp,
                    rate_customer::Column::SchoolName,
                ])
                .update_columns([
                    rate_customer::Column::CustomerFee,
                    rate_customer::Column::NetworkLineFee,
                    rate_customer::Column::GeneralFee,
                    rate_customer::Column::Extra,
                    rate_customer::Column::LastSyncTime,
                    rate_customer::Column::LastSyncRuleId,
                    rate_customer::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_with_returning(&self.db)
            .await?;
        Ok(row)
    }

    async fn update_customer_rate(&self, id: i64, patch: RateCustomerPatch) -> Result<()> {
        let mut model = rate_customer::ActiveModel {
            id: Unchanged(id),
            updated_at: Set(now()),
            ..Default::default()
        };
        if let Some(v) = patch.customer_fee {
            model.customer_fee = Set(Some(v));
        }
        if let Some(v) = patch.network_line_fee {
            model.network_line_fee = Set(Some(v));
        }
        if let Some(v) = patch.general_fee {
            model.general_fee = Set(Some(v));
        }
        if let Some(mode) = patch.fee_mode {
            model.fee_mode = Set(mode.as_str().to_string());
        }
        if let Some(extra) = patch.extra {
            model.extra = Set(extra);
        }
        if let Some(at) = patch.last_sync_time {
            model.last_sync_time = Set(Some(at));
        }
        if let Some(rule_id) = patch.last_sync_rule_id {
            model.last_sync_rule_id = Set(Some(rule_id));
        }

        model
            .update(&self.db)
            .await
            .map_err(update_err(format!("rate_customer {}", id)))?;
        Ok(())
    }

    async fn list_customer_rates(
        &self,
        filter: &CustomerRateFilter,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<rate_customer::Model>, u64)> {
        let mut query = RateCustomer::find();
        if let Some(region) = &filter.region {
            query = query.filter(rate_customer::Column::Region.eq(region.as_str()));
        }
        if let Some(cp) = &filter.cp {
            query = query.filter(rate_customer::Column::Cp.eq(cp.as_str()));
        }
        if let Some(name) = &filter.school_name {
            query = query.filter(rate_customer::Column::SchoolName.eq(name.as_str()));
        }

        let total = query.clone().count(&self.db).await?;
        if total == 0 {
            return Ok((Vec::new(), 0));
        }
        let rows = query
            .order_by(rate_customer::Column::UpdatedAt, Order::Desc)
            .order_by(rate_customer::Column::Id, Order::Desc)
            .limit(limit)
            .offset(offset)
            .all(&self.db)
            .await?;
        Ok((rows, total))
    }
}

#[async_trait]
impl FormulaStore for PgStore {
    async fn list_formulas(&self) -> Result<Vec<settlement_formulas::Model>> {
        Ok(SettlementFormulas::find()
            .order_by(settlement_formulas::Column::UpdateTime, Order::Desc)
            .order_by(settlement_formulas::Column::Id, Order::Desc)
            .all(&self.db)
            .await?)
    }

    async fn formula(&self, id: i64) -> Result<Option<settlement_formulas::Model>> {
        Ok(SettlementFormulas::find_by_id(id).one(&self.db).await?)
    }

    async fn create_formula(&self, input: FormulaInput) -> Result<settlement_formulas::Model> {
        let stamp = now();
        let model = settlement_formulas::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            tokens: Set(input.tokens),
            enabled: Set(input.enabled),
            updated_by: Set(input.updated_by),
            create_time: Set(stamp),
            update_time: Set(stamp),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn update_formula(
        &self,
        id: i64,
        input: FormulaInput,
    ) -> Result<Option<settlement_formulas::Model>> {
        let model = settlement_formulas::ActiveModel {
            id: Unchanged(id),
            name: Set(input.name),
            description: Set(input.description),
            tokens: Set(input.tokens),
            enabled: Set(input.enabled),
            updated_by: Set(input.updated_by),
            update_time: Set(now()),
            ..Default::default()
        };
        match model.update(&self.db).await {
            Ok(row) => Ok(Some(row)),
            Err(DbErr::RecordNotUpdated) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_formula(&self, id: i64) -> Result<bool> {
        let res = SettlementFormulas::delete_by_id(id).exec(&self.db).await?;
        Ok(res.rows_affected > 0)
    }

    async fn default_formula(&self) -> Result<Option<settlement_formulas::Model>> {
        Ok(SettlementFormulas::find()
            .filter(settlement_formulas::Column::Enabled.eq(true))
            .order_by(settlement_formulas::Column::UpdateTime, Order::Desc)
            .order_by(settlement_formulas::Column::Id, Order::Desc)
            .one(&self.db)
            .await?)
    }
}

/// Rows per upsert statement; 25 binds each keeps us under the 65535 limit
const RESULT_UPSERT_CHUNK: usize = 500;

/// Natural-key upsert for settlement_results
fn result_conflict() -> OnConflict {
    OnConflict::columns([
        settlement_results::Column::Region,
        settlement_results::Column::Cp,
        settlement_results::Column::SchoolId,
        settlement_results::Column::StartDate,
        settlement_results::Column::EndDate,
    ])
    .update_columns([
        settlement_results::Column::FormulaId,
        settlement_results::Column::FormulaName,
        settlement_results::Column::FormulaTokens,
        settlement_results::Column::SchoolName,
        settlement_results::Column::BillingDays,
        settlement_results::Column::Total95Flow,
        settlement_results::Column::Average95Flow,
        settlement_results::Column::CustomerFee,
        settlement_results::Column::NetworkLineFee,
        settlement_results::Column::GeneralFee,
        settlement_results::Column::NodeDeductionFee,
        settlement_results::Column::FinalFee,
        settlement_results::Column::Amount,
        settlement_results::Column::AmountRaw,
        settlement_results::Column::Currency,
        settlement_results::Column::MissingDays,
        settlement_results::Column::MissingFields,
        settlement_results::Column::CalculationDetail,
        settlement_results::Column::UpdatedAt,
    ])
    .to_owned()
}

#[async_trait]
impl ResultStore for PgStore {
    async fn upsert_results(&self, records: Vec<SettlementResultUpsert>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let stamp = now();
        let count = records.len();
        let models = records
            .into_iter()
            .map(|r| -> Result<settlement_results::ActiveModel> {
                Ok(settlement_results::ActiveModel {
                    formula_id: Set(r.formula_id),
                    formula_name: Set(r.formula_name),
                    formula_tokens: Set(r.formula_tokens),
                    region: Set(r.region),
                    cp: Set(r.cp),
                    school_id: Set(r.school_id),
                    school_name: Set(r.school_name),
                    start_date: Set(r.start_date),
                    end_date: Set(r.end_date),
                    billing_days: Set(r.billing_days),
                    total_95_flow: Set(r.total_95_flow),
                    average_95_flow: Set(r.average_95_flow),
                    customer_fee: Set(r.customer_fee),
                    network_line_fee: Set(r.network_line_fee),
                    general_fee: Set(r.general_fee),
                    node_deduction_fee: Set(r.node_deduction_fee),
                    final_fee: Set(r.final_fee),
                    amount: Set(r.amount),
                    amount_raw: Set(r.amount_raw),
                    currency: Set(r.currency),
                    missing_days: Set(r.missing_days),
                    missing_fields: Set(serde_json::to_value(&r.missing_fields)?),
                    calculation_detail: Set(r.calculation_detail),
                    created_at: Set(stamp),
                    updated_at: Set(stamp),
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let txn = self.db.begin().await?;
        for chunk in models.chunks(RESULT_UPSERT_CHUNK) {
            SettlementResults::insert_many(chunk.to_vec())
                .on_conflict(result_conflict())
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;

        debug!(count, "Upserted settlement results");
        Ok(())
    }

    async fn list_results(
        &self,
        filter: &SettlementResultFilter,
    ) -> Result<(Vec<settlement_results::Model>, u64)> {
        let mut query = SettlementResults::find();
        if let Some(d) = filter.start_date {
            query = query.filter(settlement_results::Column::StartDate.eq(d));
        }
        if let Some(d) = filter.end_date {
            query = query.filter(settlement_results::Column::EndDate.eq(d));
        }
        if let Some(region) = &filter.region {
            query = query.filter(settlement_results::Column::Region.eq(region.as_str()));
        }
        if let Some(cp) = &filter.cp {
            query = query.filter(settlement_results::Column::Cp.eq(cp.as_str()));
        }
        if let Some(school_id) = &filter.school_id {
            query = query.filter(settlement_results::Column::SchoolId.eq(school_id.as_str()));
        }
        if let Some(name) = &filter.school_name {
            query = query.filter(settlement_results::Column::SchoolName.contains(name.as_str()));
        }
        if let Some(formula_id) = filter.formula_id {
            query = query.filter(settlement_results::Column::FormulaId.eq(formula_id));
        }

        let total = query.clone().count(&self.db).await?;
        let rows = query
            .order_by(settlement_results::Column::UpdatedAt, Order::Desc)
            .order_by(settlement_results::Column::Amount, Order::Desc)
            .limit(filter.limit)
            .offset(filter.offset)
            .all(&self.db)
            .await?;
        Ok((rows, total))
    }

    async fn delete_result(&self, id: i64) -> Result<()> {
        SettlementResults::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncRuleStore for PgStore {
    async fn enabled_rules(&self) -> Result<Vec<rate_customer_sync_rules::Model>> {
        Ok(RateCustomerSyncRules::find()
            .filter(rate_customer_sync_rules::Column::Enabled.eq(true))
            .order_by(rate_customer_sync_rules::Column::Priority, Order::Asc)
            .order_by(rate_customer_sync_rules::Column::UpdatedAt, Order::Desc)
            .order_by(rate_customer_sync_rules::Column::Id, Order::Desc)
            .all(&self.db)
            .await?)
    }

    async fn list_rules(&self) -> Result<Vec<rate_customer_sync_rules::Model>> {
        Ok(RateCustomerSyncRules::find()
            .order_by(rate_customer_sync_rules::Column::Priority, Order::Asc)
            .order_by(rate_customer_sync_rules::Column::Id, Order::Asc)
            .all(&self.db)
            .await?)
    }

    async fn rule(&self, id: i64) -> Result<Option<rate_customer_sync_rules::Model>> {
        Ok(RateCustomerSyncRules::find_by_id(id).one(&self.db).await?)
    }

    async fn create_rule(&self, rule: NewSyncRule) -> Result<rate_customer_sync_rules::Model> {
        let stamp = now();
        let model = rate_customer_sync_rules::ActiveModel {
            name: Set(rule.name),
            enabled: Set(rule.enabled),
            priority: Set(rule.priority),
            scope_region: Set(rule.scope_region),
            scope_cp: Set(rule.scope_cp),
            fields_to_update: Set(rule.fields_to_update),
            overwrite_strategy: Set(rule.overwrite_strategy.as_str().to_string()),
            actions: Set(rule.actions),
            created_at: Set(stamp),
            updated_at: Set(stamp),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn update_rule(
        &self,
        id: i64,
        patch: SyncRulePatch,
    ) -> Result<Option<rate_customer_sync_rules::Model>> {
        let mut model = rate_customer_sync_rules::ActiveModel {
            id: Unchanged(id),
            updated_at: Set(now()),
            ..Default::default()
        };
        if let Some(name) = patch.name {
            model.name = Set(name);
        }
        if let Some(enabled) = patch.enabled {
            model.enabled = Set(enabled);
        }
        if let Some(priority) = patch.priority {
            model.priority = Set(priority);
        }
        if let Some(v) = patch.scope_region {
            model.scope_region = Set(Some(v));
        }
        if let Some(v) = patch.scope_cp {
            model.scope_cp = Set(Some(v));
        }
        if let Some(v) = patch.fields_to_update {
            model.fields_to_update = Set(Some(v));
        }
        if let Some(strategy) = patch.overwrite_strategy {
            model.overwrite_strategy = Set(strategy.as_str().to_string());
        }
        if let Some(actions) = patch.actions {
            model.actions = Set(actions);
        }

        match model.update(&self.db).await {
            Ok(row) => Ok(Some(row)),
            Err(DbErr::RecordNotUpdated) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_rule(&self, id: i64) -> Result<bool> {
        let res = RateCustomerSyncRules::delete_by_id(id).exec(&self.db).await?;
        Ok(res.rows_affected > 0)
    }
}

#[async_trait]
impl FieldSchemaStore for PgStore {
    async fn field_defs(&self) -> Result<Vec<rate_customer_field_defs::Model>> {
        Ok(RateCustomerFieldDefs::find()
            .order_by(rate_customer_field_defs::Column::Id, Order::Asc)
            .all(&self.db)
            .await?)
    }

    async fn create_field_def(
        &self,
        input: FieldDefInput,
    ) -> Result<rate_customer_field_defs::Model> {
        let stamp = now();
        let model = rate_customer_field_defs::ActiveModel {
            field_key: Set(input.field_key),
            label: Set(input.label),
            data_type: Set(input.data_type),
            enabled: Set(input.enabled),
            usable_in_rules: Set(input.usable_in_rules),
            min: Set(input.min),
            max: Set(input.max),
            enum_options: Set(input.enum_options),
            created_at: Set(stamp),
            updated_at: Set(stamp),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }
}

#[async_trait]
impl ConfigStore for PgStore {
    async fn settlement_config(&self) -> Result<Option<settlement_config::Model>> {
        Ok(SettlementConfig::find()
            .order_by(settlement_config::Column::Id, Order::Asc)
            .one(&self.db)
            .await?)
    }

    async fn save_settlement_config(
        &self,
        config: ScheduleConfig,
    ) -> Result<settlement_config::Model> {
        let existing = self.settlement_config().await?;
        let mut model = settlement_config::ActiveModel {
            daily_time: Set(config.daily_time),
            weekly_day: Set(config.weekly_day as i32),
            weekly_time: Set(config.weekly_time),
            enabled: Set(config.enabled),
            last_execute_time: Set(config.last_execute_time),
            update_time: Set(now()),
            ..Default::default()
        };

        match existing {
            Some(row) => {
                model.id = Unchanged(row.id);
                Ok(model.update(&self.db).await?)
            }
            None => Ok(model.insert(&self.db).await?),
        }
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn find_task(
        &self,
        task_type: TaskType,
        task_date: NaiveDate,
    ) -> Result<Option<settlement_task::Model>> {
        Ok(SettlementTask::find()
            .filter(settlement_task::Column::TaskType.eq(task_type.as_str()))
            .filter(settlement_task::Column::TaskDate.eq(task_date))
            .order_by(settlement_task::Column::Id, Order::Desc)
            .one(&self.db)
            .await?)
    }

    async fn create_task(&self, task: NewSettlementTask) -> Result<settlement_task::Model> {
        let stamp = now();
        let model = settlement_task::ActiveModel {
            task_type: Set(task.task_type.as_str().to_string()),
            task_date: Set(task.task_date),
            end_date: Set(task.end_date),
            status: Set(TaskStatus::Pending.as_str().to_string()),
            start_time: Set(None),
            end_time: Set(None),
            processed_count: Set(0),
            error_message: Set(None),
            create_time: Set(stamp),
            update_time: Set(stamp),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn update_task(&self, id: i64, update: TaskUpdate) -> Result<()> {
        let mut model = settlement_task::ActiveModel {
            id: Unchanged(id),
            status: Set(update.status.as_str().to_string()),
            update_time: Set(now()),
            ..Default::default()
        };
        if let Some(at) = update.start_time {
            model.start_time = Set(Some(at));
        }
        if let Some(at) = update.end_time {
            model.end_time = Set(Some(at));
        }
        if let Some(count) = update.processed_count {
            model.processed_count = Set(count);
        }
        if let Some(msg) = update.error_message {
            model.error_message = Set(Some(msg));
        }

        model
            .update(&self.db)
            .await
            .map_err(update_err(format!("settlement task {}", id)))?;
        Ok(())
    }

    async fn list_tasks(&self, limit: u64) -> Result<Vec<settlement_task::Model>> {
        Ok(SettlementTask::find()
            .order_by(settlement_task::Column::Id, Order::Desc)
            .limit(limit)
            .all(&self.db)
            .await?)
    }
}

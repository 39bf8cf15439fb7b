//! In-process store backing tests and embedded use.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;

use super::{
    ConfigStore, DailySettlementStore, FieldSchemaStore, FormulaStore, RateStore, ResultStore,
    SchoolDirectory, SyncRuleStore, TaskStore, TrafficSampleStore,
};
use crate::entities::{
    rate_customer, rate_customer_field_defs, rate_customer_sync_rules, school, school_settlement,
    school_traffic, settlement_config, settlement_formulas, settlement_results, settlement_task,
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

#[derive(Default)]
struct Tables {
    next_id: i64,
    last_stamp: Option<NaiveDateTime>,
    schools: Vec<school::Model>,
    samples: Vec<school_traffic::Model>,
    daily: Vec<school_settlement::Model>,
    rates: Vec<rate_customer::Model>,
    formulas: Vec<settlement_formulas::Model>,
    results: Vec<settlement_results::Model>,
    rules: Vec<rate_customer_sync_rules::Model>,
    field_defs: Vec<rate_customer_field_defs::Model>,
    config: Option<settlement_config::Model>,
    tasks: Vec<settlement_task::Model>,
    /// Rate writes allowed before the store starts failing
    rate_write_budget: Option<usize>,
}

impl Tables {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing wall-clock stamp so "most recent" orderings are stable
    fn stamp(&mut self) -> NaiveDateTime {
        let now = Utc::now().naive_utc();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn spend_rate_write(&mut self) -> Result<()> {
        match self.rate_write_budget.as_mut() {
            Some(0) => Err(SettlementError::Persistence(
                "rate_customer write rejected".to_string(),
            )),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a school, replacing any row with the same `school_id`
    pub fn add_school(&self, school_id: &str, school_name: &str, region: &str, cp: &str) {
        let mut t = self.tables.lock();
        t.schools.retain(|s| s.school_id != school_id);
        let id = t.id();
        let update_time = t.stamp();
        t.schools.push(school::Model {
            id,
            school_id: school_id.to_string(),
            school_name: school_name.to_string(),
            region: region.to_string(),
            cp: cp.to_string(),
            update_time,
        });
    }

    pub fn add_sample(&self, sample: SampleSeed<'_>) {
        let mut t = self.tables.lock();
        let id = t.id();
        t.samples.push(school_traffic::Model {
            id,
            create_time: sample.at,
            school_id: sample.school_id.to_string(),
            school_name: sample.school_name.to_string(),
            region: sample.region.to_string(),
            cp: sample.cp.to_string(),
            total_recv: sample.bytes_received,
            total_send: sample.bytes_sent,
        });
    }

    /// Make every rate write after the next `allowed` ones fail
    pub fn fail_rate_writes_after(&self, allowed: usize) {
        self.tables.lock().rate_write_budget = Some(allowed);
    }

    pub fn rate_rows(&self) -> Vec<rate_customer::Model> {
        self.tables.lock().rates.clone()
    }

    pub fn daily_rows(&self) -> Vec<school_settlement::Model> {
        self.tables.lock().daily.clone()
    }

    pub fn result_rows(&self) -> Vec<settlement_results::Model> {
        self.tables.lock().results.clone()
    }

    pub fn task_rows(&self) -> Vec<settlement_task::Model> {
        self.tables.lock().tasks.clone()
    }
}

/// Seed data for one traffic sample
#[derive(Debug, Clone, Copy)]
pub struct SampleSeed<'a> {
    pub school_id: &'a str,
    pub school_name: &'a str,
    pub region: &'a str,
    pub cp: &'a str,
    pub at: NaiveDateTime,
    pub bytes_received: i64,
    pub bytes_sent: i64,
}

fn distinct_sorted<'a>(values: impl Iterator<Item = &'a String>) -> Vec<String> {
    values
        .filter(|v| !v.is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[async_trait]
impl TrafficSampleStore for MemoryStore {
    async fn samples(
        &self,
        school_id: &str,
        day_start: NaiveDateTime,
        day_end: NaiveDateTime,
        region: Option<&str>,
        cp: Option<&str>,
    ) -> Result<Vec<school_traffic::Model>> {
        let t = self.tables.lock();
        Ok(t.samples
            .iter()
            .filter(|s| {
                s.school_id == school_id
                    && s.create_time >= day_start
                    && s.create_time <= day_end
                    && region.is_none_or(|r| s.region == r)
                    && cp.is_none_or(|c| s.cp == c)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SchoolDirectory for MemoryStore {
    async fn school(
        &self,
        school_id: &str,
        region: Option<&str>,
        cp: Option<&str>,
    ) -> Result<Option<school::Model>> {
        let t = self.tables.lock();
        Ok(t.schools
            .iter()
            .find(|s| {
                s.school_id == school_id
                    && region.is_none_or(|r| s.region == r)
                    && cp.is_none_or(|c| s.cp == c)
            })
            .cloned())
    }

    async fn schools(
        &self,
        filter: &SchoolFilter,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<school::Model>, u64)> {
        let t = self.tables.lock();
        let mut matched: Vec<&school::Model> = t
            .schools
            .iter()
            .filter(|s| {
                filter.region.as_ref().is_none_or(|r| &s.region == r)
                    && filter.cp.as_ref().is_none_or(|c| &s.cp == c)
            })
            .collect();
        matched.sort_by_key(|s| s.id);
        let total = matched.len() as u64;
        let page = matched
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn regions(&self) -> Result<Vec<String>> {
        let t = self.tables.lock();
        Ok(distinct_sorted(t.schools.iter().map(|s| &s.region)))
    }

    async fn cps(&self) -> Result<Vec<String>> {
        let t = self.tables.lock();
        Ok(distinct_sorted(t.schools.iter().map(|s| &s.cp)))
    }
}

#[async_trait]
impl DailySettlementStore for MemoryStore {
    async fn upsert_daily(&self, value: NewDailySettlement) -> Result<school_settlement::Model> {
        let mut t = self.tables.lock();
        let now = t.stamp();

        if let Some(row) = t.daily.iter_mut().find(|d| {
            d.region == value.region
                && d.cp == value.cp
                && d.school_id == value.school_id
                && d.settlement_date == value.date
        }) {
            row.school_name = value.school_name;
            row.settlement_value = value.value;
            row.settlement_time = value.sample_time;
            row.update_time = now;
            return Ok(row.clone());
        }

        let id = t.id();
        let row = school_settlement::Model {
            id,
            school_id: value.school_id,
            school_name: value.school_name,
            region: value.region,
            cp: value.cp,
            settlement_value: value.value,
            settlement_time: value.sample_time,
            settlement_date: value.date,
            create_time: now,
            update_time: now,
        };
        t.daily.push(row.clone());
        Ok(row)
    }

    async fn list_daily(
        &self,
        filter: &DailySettlementFilter,
    ) -> Result<Vec<school_settlement::Model>> {
        let t = self.tables.lock();
        let mut rows: Vec<_> = t.daily.iter().filter(|d| filter.matches(d)).cloned().collect();
        rows.sort_by(|a, b| {
            a.settlement_date
                .cmp(&b.settlement_date)
                .then_with(|| a.school_id.cmp(&b.school_id))
        });
        Ok(rows)
    }

    async fn aggregate_flows(&self, filter: &DailySettlementFilter) -> Result<Vec<AggregatedFlow>> {
        let t = self.tables.lock();

        let mut groups: BTreeMap<(String, String, String, String), AggregatedFlow> =
            BTreeMap::new();
        for row in t.daily.iter().filter(|d| filter.matches(d)) {
            let key = (
                row.region.clone(),
                row.cp.clone(),
                row.school_id.clone(),
                row.school_name.clone(),
            );
            let entry = groups
                .entry(key)
                .or_insert_with(|| AggregatedFlow {
                    region: row.region.clone(),
                    cp: row.cp.clone(),
                    school_id: row.school_id.clone(),
                    school_name: row.school_name.clone(),
                    ..Default::default()
                });
            entry.day_count += 1;
            entry.total_flow += row.settlement_value as f64;
        }

        let mut flows: Vec<AggregatedFlow> = groups
            .into_values()
            .map(|mut flow| {
                if let Some(rate) = t.rates.iter().find(|r| {
                    r.region == flow.region && r.cp == flow.cp && r.school_name == flow.school_name
                }) {
                    flow.customer_fee = rate.customer_fee;
                    flow.network_line_fee = rate.network_line_fee;
                    flow.general_fee = rate.general_fee;
                    flow.apply_extra(&rate.extra);
                }
                flow
            })
            .collect();

        flows.sort_by(|a, b| b.total_flow.total_cmp(&a.total_flow));
        Ok(flows)
    }
}

#[async_trait]
impl RateStore for MemoryStore {
    async fn find_customer_rate(
        &self,
        region: &str,
        cp: &str,
        school_name: &str,
    ) -> Result<Option<rate_customer::Model>> {
        let t = self.tables.lock();
        Ok(t.rates
            .iter()
            .find(|r| r.region == region && r.cp == cp && r.school_name == school_name)
            .cloned())
    }

    async fn insert_customer_rate(&self, rate: NewRateCustomer) -> Result<rate_customer::Model> {
        let mut t = self.tables.lock();
        t.spend_rate_write()?;
        if t.rates
            .iter()
            .any(|r| r.region == rate.region && r.cp == rate.cp && r.school_name == rate.school_name)
        {
            return Err(SettlementError::Persistence(format!(
                "duplicate rate_customer ({}, {}, {})",
                rate.region, rate.cp, rate.school_name
            )));
        }

        let id = t.id();
        let now = t.stamp();
        let row = rate_customer::Model {
            id,
            region: rate.region,
            cp: rate.cp,
            school_name: rate.school_name,
            customer_fee: rate.customer_fee,
            network_line_fee: rate.network_line_fee,
            general_fee: rate.general_fee,
            fee_mode: rate.fee_mode.as_str().to_string(),
            extra: if rate.extra.is_null() { json!({}) } else { rate.extra },
            last_sync_time: rate.last_sync_time,
            last_sync_rule_id: rate.last_sync_rule_id,
            created_at: now,
            updated_at: now,
        };
        t.rates.push(row.clone());
        Ok(row)
    }

    async fn update_customer_rate(&self, id: i64, patch: RateCustomerPatch) -> Result<()> {
        let mut t = self.tables.lock();
        t.spend_rate_write()?;
        let now = t.stamp();
        let row = t
            .rates
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| SettlementError::not_found(format!("rate_customer {}", id)))?;

        if let Some(v) = patch.customer_fee {
            row.customer_fee = Some(v);
        }
        if let Some(v) = patch.network_line_fee {
            row.network_line_fee = Some(v);
        }
        if let Some(v) = patch.general_fee {
            row.general_fee = Some(v);
        }
        if let Some(mode) = patch.fee_mode {
            row.fee_mode = mode.as_str().to_string();
        }
        if let Some(extra) = patch.extra {
            row.extra = extra;
        }
        if let Some(at) = patch.last_sync_time {
            row.last_sync_time = Some(at);
        }
        if let Some(rule_id) = patch.last_sync_rule_id {
            row.last_sync_rule_id = Some(rule_id);
        }
        row.updated_at = now;
        Ok(())
    }

    async fn list_customer_rates(
        &self,
        filter: &CustomerRateFilter,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<rate_customer::Model>, u64)> {
        let t = self.tables.lock();
        let matches = |want: &Option<String>, have: &str| want.as_deref().is_none_or(|w| w == have);
        let mut rows: Vec<_> = t
            .rates
            .iter()
            .filter(|r| {
                matches(&filter.region, &r.region)
                    && matches(&filter.cp, &r.cp)
                    && matches(&filter.school_name, &r.school_name)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));

        let total = rows.len() as u64;
        let page = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl FormulaStore for MemoryStore {
    async fn list_formulas(&self) -> Result<Vec<settlement_formulas::Model>> {
        let t = self.tables.lock();
        let mut rows = t.formulas.clone();
        rows.sort_by(|a, b| b.update_time.cmp(&a.update_time).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn formula(&self, id: i64) -> Result<Option<settlement_formulas::Model>> {
        let t = self.tables.lock();
        Ok(t.formulas.iter().find(|f| f.id == id).cloned())
    }

    async fn create_formula(&self, input: FormulaInput) -> Result<settlement_formulas::Model> {
        let mut t = self.tables.lock();
        let id = t.id();
        let now = t.stamp();
        let row = settlement_formulas::Model {
            id,
            name: input.name,
            description: input.description,
            tokens: input.tokens,
            enabled: input.enabled,
            updated_by: input.updated_by,
            create_time: now,
            update_time: now,
        };
        t.formulas.push(row.clone());
        Ok(row)
    }

    async fn update_formula(
        &self,
        id: i64,
        input: FormulaInput,
    ) -> Result<Option<settlement_formulas::Model>> {
        let mut t = self.tables.lock();
        let now = t.stamp();
        let Some(row) = t.formulas.iter_mut().find(|f| f.id == id) else {
            return Ok(None);
        };
        row.name = input.name;
        row.description = input.description;
        row.tokens = input.tokens;
        row.enabled = input.enabled;
        row.updated_by = input.updated_by;
        row.update_time = now;
        Ok(Some(row.clone()))
    }

    async fn delete_formula(&self, id: i64) -> Result<bool> {
        let mut t = self.tables.lock();
        let before = t.formulas.len();
        t.formulas.retain(|f| f.id != id);
        Ok(t.formulas.len() != before)
    }

    async fn default_formula(&self) -> Result<Option<settlement_formulas::Model>> {
        let t = self.tables.lock();
        Ok(t.formulas
            .iter()
            .filter(|f| f.enabled)
            .max_by(|a, b| a.update_time.cmp(&b.update_time).then(a.id.cmp(&b.id)))
            .cloned())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn upsert_results(&self, records: Vec<SettlementResultUpsert>) -> Result<()> {
        let mut t = self.tables.lock();
        for record in records {
            let now = t.stamp();
            let missing_fields = serde_json::to_value(&record.missing_fields)?;

            if let Some(row) = t.results.iter_mut().find(|r| {
                r.region == record.region
                    && r.cp == record.cp
                    && r.school_id == record.school_id
                    && r.start_date == record.start_date
                    && r.end_date == record.end_date
            }) {
                row.formula_id = record.formula_id;
                row.formula_name = record.formula_name;
                row.formula_tokens = record.formula_tokens;
                row.school_name = record.school_name;
                row.billing_days = record.billing_days;
                row.total_95_flow = record.total_95_flow;
                row.average_95_flow = record.average_95_flow;
                row.customer_fee = record.customer_fee;
                row.network_line_fee = record.network_line_fee;
                row.general_fee = record.general_fee;
                row.node_deduction_fee = record.node_deduction_fee;
                row.final_fee = record.final_fee;
                row.amount = record.amount;
                row.amount_raw = record.amount_raw;
                row.currency = record.currency;
                row.missing_days = record.missing_days;
                row.missing_fields = missing_fields;
                row.calculation_detail = record.calculation_detail;
                row.updated_at = now;
                continue;
            }

            let id = t.id();
            t.results.push(settlement_results::Model {
                id,
                formula_id: record.formula_id,
                formula_name: record.formula_name,
                formula_tokens: record.formula_tokens,
                region: record.region,
                cp: record.cp,
                school_id: record.school_id,
                school_name: record.school_name,
                start_date: record.start_date,
                end_date: record.end_date,
                billing_days: record.billing_days,
                total_95_flow: record.total_95_flow,
                average_95_flow: record.average_95_flow,
                customer_fee: record.customer_fee,
                network_line_fee: record.network_line_fee,
                general_fee: record.general_fee,
                node_deduction_fee: record.node_deduction_fee,
                final_fee: record.final_fee,
                amount: record.amount,
                amount_raw: record.amount_raw,
                currency: record.currency,
                missing_days: record.missing_days,
                missing_fields,
                calculation_detail: record.calculation_detail,
                created_at: now,
                updated_at: now,
            });
        }
        Ok(())
    }

    async fn list_results(
        &self,
        filter: &SettlementResultFilter,
    ) -> Result<(Vec<settlement_results::Model>, u64)> {
        let t = self.tables.lock();
        let mut rows: Vec<_> = t.results.iter().filter(|r| filter.matches(r)).cloned().collect();
        rows.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.amount.cmp(&a.amount))
        });
        let total = rows.len() as u64;
        let page = rows
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn delete_result(&self, id: i64) -> Result<()> {
        self.tables.lock().results.retain(|r| r.id != id);
        Ok(())
    }
}

#[async_trait]
impl SyncRuleStore for MemoryStore {
    async fn enabled_rules(&self) -> Result<Vec<rate_customer_sync_rules::Model>> {
        let t = self.tables.lock();
        let mut rules: Vec<_> = t.rules.iter().filter(|r| r.enabled).cloned().collect();
        rules.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(rules)
    }

    async fn list_rules(&self) -> Result<Vec<rate_customer_sync_rules::Model>> {
        let t = self.tables.lock();
        let mut rules = t.rules.clone();
        rules.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));
        Ok(rules)
    }

    async fn rule(&self, id: i64) -> Result<Option<rate_customer_sync_rules::Model>> {
        let t = self.tables.lock();
        Ok(t.rules.iter().find(|r| r.id == id).cloned())
    }

    async fn create_rule(&self, rule: NewSyncRule) -> Result<rate_customer_sync_rules::Model> {
        let mut t = self.tables.lock();
        let id = t.id();
        let now = t.stamp();
        let row = rate_customer_sync_rules::Model {
            id,
            name: rule.name,
            enabled: rule.enabled,
            priority: rule.priority,
            scope_region: rule.scope_region,
            scope_cp: rule.scope_cp,
            fields_to_update: rule.fields_to_update,
            overwrite_strategy: rule.overwrite_strategy.as_str().to_string(),
            actions: rule.actions,
            created_at: now,
            updated_at: now,
        };
        t.rules.push(row.clone());
        Ok(row)
    }

    async fn update_rule(
        &self,
        id: i64,
        patch: SyncRulePatch,
    ) -> Result<Option<rate_customer_sync_rules::Model>> {
        let mut t = self.tables.lock();
        let now = t.stamp();
        let Some(row) = t.rules.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            row.name = name;
        }
        if let Some(enabled) = patch.enabled {
            row.enabled = enabled;
        }
        if let Some(priority) = patch.priority {
            row.priority = priority;
        }
        if let Some(v) = patch.scope_region {
            row.scope_region = Some(v);
        }
        if let Some(v) = patch.scope_cp {
            row.scope_cp = Some(v);
        }
        if let Some(v) = patch.fields_to_update {
            row.fields_to_update = Some(v);
        }
        if let Some(strategy) = patch.overwrite_strategy {
            row.overwrite_strategy = strategy.as_str().to_string();
        }
        if let Some(actions) = patch.actions {
            row.actions = actions;
        }
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn delete_rule(&self, id: i64) -> Result<bool> {
        let mut t = self.tables.lock();
        let before = t.rules.len();
        t.rules.retain(|r| r.id != id);
        Ok(t.rules.len() != before)
    }
}

#[async_trait]
impl FieldSchemaStore for MemoryStore {
    async fn field_defs(&self) -> Result<Vec<rate_customer_field_defs::Model>> {
        Ok(self.tables.lock().field_defs.clone())
    }

    async fn create_field_def(
        &self,
        input: FieldDefInput,
    ) -> Result<rate_customer_field_defs::Model> {
        let mut t = self.tables.lock();
        if t.field_defs.iter().any(|d| d.field_key == input.field_key) {
            return Err(SettlementError::validation(format!(
                "field_key {} already exists",
                input.field_key
            )));
        }
        let id = t.id();
        let now = t.stamp();
        let row = rate_customer_field_defs::Model {
            id,
            field_key: input.field_key,
            label: input.label,
            data_type: input.data_type,
            enabled: input.enabled,
            usable_in_rules: input.usable_in_rules,
            min: input.min,
            max: input.max,
            enum_options: input.enum_options,
            created_at: now,
            updated_at: now,
        };
        t.field_defs.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn settlement_config(&self) -> Result<Option<settlement_config::Model>> {
        Ok(self.tables.lock().config.clone())
    }

    async fn save_settlement_config(
        &self,
        config: ScheduleConfig,
    ) -> Result<settlement_config::Model> {
        let mut t = self.tables.lock();
        let now = t.stamp();
        let id = match t.config.as_ref() {
            Some(existing) => existing.id,
            None => t.id(),
        };
        let row = settlement_config::Model {
            id,
            daily_time: config.daily_time,
            weekly_day: config.weekly_day as i32,
            weekly_time: config.weekly_time,
            enabled: config.enabled,
            last_execute_time: config.last_execute_time,
            update_time: now,
        };
        t.config = Some(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn find_task(
        &self,
        task_type: TaskType,
        task_date: NaiveDate,
    ) -> Result<Option<settlement_task::Model>> {
        let t = self.tables.lock();
        Ok(t.tasks
            .iter()
            .filter(|task| task.task_type == task_type.as_str() && task.task_date == task_date)
            .max_by_key(|task| task.id)
            .cloned())
    }

    async fn create_task(&self, task: NewSettlementTask) -> Result<settlement_task::Model> {
        let mut t = self.tables.lock();
        let id = t.id();
        let now = t.stamp();
        let row = settlement_task::Model {
            id,
            task_type: task.task_type.as_str().to_string(),
            task_date: task.task_date,
            end_date: task.end_date,
            status: TaskStatus::Pending.as_str().to_string(),
            start_time: None,
            end_time: None,
            processed_count: 0,
            error_message: None,
            create_time: now,
            update_time: now,
        };
        t.tasks.push(row.clone());
        Ok(row)
    }

    async fn update_task(&self, id: i64, update: TaskUpdate) -> Result<()> {
        let mut t = self.tables.lock();
        let now = t.stamp();
        let row = t
            .tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| SettlementError::not_found(format!("settlement task {}", id)))?;
        row.status = update.status.as_str().to_string();
        if let Some(at) = update.start_time {
            row.start_time = Some(at);
        }
        if let Some(at) = update.end_time {
            row.end_time = Some(at);
        }
        if let Some(count) = update.processed_count {
            row.processed_count = count;
        }
        if let Some(msg) = update.error_message {
            row.error_message = Some(msg);
        }
        row.update_time = now;
        Ok(())
    }

    async fn list_tasks(&self, limit: u64) -> Result<Vec<settlement_task::Model>> {
        let t = self.tables.lock();
        let mut rows = t.tasks.clone();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rates::FeeMode;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn daily(school_id: &str, date: NaiveDate, value: i64) -> NewDailySettlement {
        NewDailySettlement {
            school_id: school_id.to_string(),
            school_name: format!("{} school", school_id),
            region: "east".to_string(),
            cp: "telecom".to_string(),
            value,
            sample_time: date.and_hms_opt(12, 0, 0).unwrap(),
            date,
        }
    }

    #[tokio::test]
    async fn test_upsert_daily_overwrites_natural_key() {
        let store = MemoryStore::new();
        let first = store.upsert_daily(daily("s1", day(1), 100)).await.unwrap();
        let second = store.upsert_daily(daily("s1", day(1), 250)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.daily_rows().len(), 1);
        assert_eq!(store.daily_rows()[0].settlement_value, 250);
    }

    #[tokio::test]
    async fn test_aggregate_joins_rate_row() {
        let store = MemoryStore::new();
        store.upsert_daily(daily("s1", day(1), 100)).await.unwrap();
        store.upsert_daily(daily("s1", day(2), 300)).await.unwrap();
        store
            .insert_customer_rate(NewRateCustomer {
                region: "east".into(),
                cp: "telecom".into(),
                school_name: "s1 school".into(),
                customer_fee: Some(12.0),
                network_line_fee: None,
                general_fee: None,
                fee_mode: FeeMode::Auto,
                extra: json!({"final_fee": 3}),
                last_sync_time: None,
                last_sync_rule_id: None,
            })
            .await
            .unwrap();

        let filter = DailySettlementFilter {
            start_date: day(1),
            end_date: day(5),
            region: None,
            cp: None,
            school_id: None,
            school_name: None,
        };
        let flows = store.aggregate_flows(&filter).await.unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].day_count, 2);
        assert_eq!(flows[0].total_flow, 400.0);
        assert_eq!(flows[0].customer_fee, Some(12.0));
        assert_eq!(flows[0].final_fee, Some(3.0));
    }

    #[tokio::test]
    async fn test_default_formula_prefers_latest_enabled() {
        let store = MemoryStore::new();
        let input = |name: &str, enabled: bool| FormulaInput {
            name: name.to_string(),
            description: None,
            tokens: json!([]),
            enabled,
            updated_by: None,
        };
        store.create_formula(input("a", true)).await.unwrap();
        let b = store.create_formula(input("b", true)).await.unwrap();
        store.create_formula(input("c", false)).await.unwrap();

        let default = store.default_formula().await.unwrap().unwrap();
        assert_eq!(default.id, b.id);
    }

    #[tokio::test]
    async fn test_list_results_pages_and_orders() {
        let store = MemoryStore::new();
        let record = |school_id: &str, amount| SettlementResultUpsert {
            formula_id: 1,
            formula_name: "f".into(),
            formula_tokens: json!([]),
            region: "east".into(),
            cp: "telecom".into(),
            school_id: school_id.into(),
            school_name: school_id.into(),
            start_date: day(1),
            end_date: day(2),
            billing_days: 2,
            total_95_flow: 0.0,
            average_95_flow: 0.0,
            customer_fee: None,
            network_line_fee: None,
            general_fee: None,
            node_deduction_fee: None,
            final_fee: None,
            amount,
            amount_raw: 0.0,
            currency: "CNY".into(),
            missing_days: 0,
            missing_fields: vec![],
            calculation_detail: json!({}),
        };
        store
            .upsert_results(vec![record("s1", dec!(1.00)), record("s2", dec!(2.00))])
            .await
            .unwrap();

        let mut filter = SettlementResultFilter::for_range(day(1), day(2));
        filter.limit = 1;
        let (page, total) = store.list_results(&filter).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);
        // s2 was written last
        assert_eq!(page[0].school_id, "s2");
    }

    #[tokio::test]
    async fn test_rate_write_failure_injection() {
        let store = MemoryStore::new();
        store.fail_rate_writes_after(0);
        let err = store
            .update_customer_rate(1, RateCustomerPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Persistence(_)));
    }
}

//! Rule-driven synchronization of negotiated customer rates.
//!
//! Enabled rules run in ascending priority. Each rule walks every school in
//! its region/cp scope, finds or creates the school's rate row and stages
//! the rule's actions under its overwrite strategy. Rows are written one at a
//! time so later rules observe what earlier rules committed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::entities::{rate_customer, rate_customer_sync_rules, school};
use crate::error::SettlementError;
use crate::models::rates::{
    FeeMode, NewRateCustomer, OverwriteStrategy, RateCustomerPatch, SchoolFilter,
    TOP_LEVEL_FEE_FIELDS,
};
use crate::models::settlement::json_number;
use crate::services::customer_fields::{is_valid_field_key, FieldSchema};
use crate::store::{FieldSchemaStore, RateStore, SchoolDirectory, SyncRuleStore};

/// A store failure stopped the run; rows already written stay written
#[derive(Debug, Error)]
#[error("rate sync aborted after {affected} affected rows: {source}")]
pub struct SyncAborted {
    pub affected: u64,
    #[source]
    pub source: SettlementError,
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// `{"type": "template", "values": {...}}` or `{"set": {...}}`
pub fn parse_actions(actions: &Value) -> Map<String, Value> {
    let object = |v: Option<&Value>| v.and_then(Value::as_object).cloned().unwrap_or_default();
    if actions.get("type").and_then(Value::as_str) == Some("template") {
        return object(actions.get("values"));
    }
    object(actions.get("set"))
}

/// Legacy `fields_to_update: {"extra": {...}}`
fn legacy_extra(fields_to_update: Option<&Value>) -> Map<String, Value> {
    fields_to_update
        .and_then(|v| v.get("extra"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn is_top_level_fee(key: &str) -> bool {
    TOP_LEVEL_FEE_FIELDS.contains(&key)
}

/// A rule with its action map resolved and filtered
#[derive(Debug, Clone)]
pub struct PreparedRule {
    pub id: i64,
    pub name: String,
    pub strategy: OverwriteStrategy,
    pub regions: Vec<String>,
    pub cps: Vec<String>,
    pub actions: BTreeMap<String, Value>,
}

impl PreparedRule {
    /// `None` when the strategy is unknown or no action survives filtering
    pub fn prepare(rule: &rate_customer_sync_rules::Model, schema: &FieldSchema) -> Option<Self> {
        let Some(strategy) = OverwriteStrategy::from_str(&rule.overwrite_strategy) else {
            warn!(rule_id = rule.id, strategy = %rule.overwrite_strategy, "Unknown overwrite strategy, rule skipped");
            return None;
        };

        let mut actions = parse_actions(&rule.actions);
        for (key, value) in legacy_extra(rule.fields_to_update.as_ref()) {
            actions.entry(key).or_insert(value);
        }

        let whitelist = string_list(rule.fields_to_update.as_ref());
        let mut kept = BTreeMap::new();
        for (key, value) in actions {
            if !is_valid_field_key(&key) {
                continue;
            }
            if !whitelist.is_empty() && !whitelist.iter().any(|w| w == &key) {
                continue;
            }
            if !is_top_level_fee(&key) {
                if let Some(reason) = schema.rejection(&key, &value) {
                    warn!(rule_id = rule.id, field = %key, %reason, "Rule action dropped");
                    continue;
                }
            }
            kept.insert(key, value);
        }

        if kept.is_empty() {
            info!(rule_id = rule.id, name = %rule.name, "Rule has no applicable actions, skipped");
            return None;
        }

        Some(Self {
            id: rule.id,
            name: rule.name.clone(),
            strategy,
            regions: string_list(rule.scope_region.as_ref()),
            cps: string_list(rule.scope_cp.as_ref()),
            actions: kept,
        })
    }
}

/// Snapshot of a rate row as a rule sees it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentRate {
    pub fee_mode: Option<FeeMode>,
    pub customer_fee: Option<f64>,
    pub network_line_fee: Option<f64>,
    pub general_fee: Option<f64>,
    pub extra: Map<String, Value>,
}

impl CurrentRate {
    fn fee(&self, key: &str) -> Option<f64> {
        match key {
            "customer_fee" => self.customer_fee,
            "network_line_fee" => self.network_line_fee,
            "general_fee" => self.general_fee,
            _ => None,
        }
    }
}

impl From<&rate_customer::Model> for CurrentRate {
    fn from(row: &rate_customer::Model) -> Self {
        Self {
            fee_mode: FeeMode::from_str(&row.fee_mode),
            customer_fee: row.customer_fee,
            network_line_fee: row.network_line_fee,
            general_fee: row.general_fee,
            extra: row.extra.as_object().cloned().unwrap_or_default(),
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Changes `rule` makes to `current`, `None` if nothing changes.
/// The patch carries the complete new extra bag whenever anything changed.
pub fn apply_rule(rule: &PreparedRule, current: &CurrentRate) -> Option<RateCustomerPatch> {
    let mut patch = RateCustomerPatch::default();
    let mut extra = current.extra.clone();
    let mut changed = false;

    for (key, value) in &rule.actions {
        if is_top_level_fee(key) {
            if current.fee_mode == Some(FeeMode::Configed) {
                continue;
            }
            let Some(new_fee) = json_number(value) else {
                continue;
            };
            let stage = match rule.strategy {
                OverwriteStrategy::Always => current.fee(key) != Some(new_fee),
                OverwriteStrategy::IfEmpty => current.fee(key).is_none(),
            };
            if stage {
                patch.set_fee(key, new_fee);
                changed = true;
            }
            continue;
        }

        let stage = match (rule.strategy, extra.get(key)) {
            (_, None) => true,
            (OverwriteStrategy::Always, Some(old)) => old != value,
            (OverwriteStrategy::IfEmpty, Some(old)) => is_empty_value(old),
        };
        if stage {
            extra.insert(key.clone(), value.clone());
            changed = true;
        }
    }

    if !changed {
        return None;
    }
    patch.extra = Some(Value::Object(extra));
    Some(patch)
}

#[derive(Clone)]
pub struct RateSyncEngine {
    rules: Arc<dyn SyncRuleStore>,
    rates: Arc<dyn RateStore>,
    schools: Arc<dyn SchoolDirectory>,
    fields: Arc<dyn FieldSchemaStore>,
    page_size: u64,
}

impl RateSyncEngine {
    pub fn new(
        rules: Arc<dyn SyncRuleStore>,
        rates: Arc<dyn RateStore>,
        schools: Arc<dyn SchoolDirectory>,
        fields: Arc<dyn FieldSchemaStore>,
        page_size: u64,
    ) -> Self {
        Self {
            rules,
            rates,
            schools,
            fields,
            page_size: page_size.max(1),
        }
    }

    /// Run every enabled rule; returns the number of rows changed or created
    pub async fn execute_sync(&self) -> Result<u64, SyncAborted> {
        let mut affected = 0;
        match self.run(&mut affected).await {
            Ok(()) => {
                info!(affected, "Rate sync finished");
                Ok(affected)
            }
            Err(source) => Err(SyncAborted { affected, source }),
        }
    }

    async fn run(&self, affected: &mut u64) -> crate::error::Result<()> {
        let rules = self.rules.enabled_rules().await?;
        info!(rules = rules.len(), "Loaded enabled sync rules");
        if rules.is_empty() {
            return Ok(());
        }

        let schema = FieldSchema::new(self.fields.field_defs().await?);
        let now = Utc::now().naive_utc();

        for rule in &rules {
            let Some(prepared) = PreparedRule::prepare(rule, &schema) else {
                continue;
            };
            info!(
                rule_id = prepared.id,
                name = %prepared.name,
                strategy = prepared.strategy.as_str(),
                regions = ?prepared.regions,
                cps = ?prepared.cps,
                keys = ?prepared.actions.keys().collect::<Vec<_>>(),
                "Rule begin"
            );

            let regions = scope(&prepared.regions);
            let cps = scope(&prepared.cps);
            for region in &regions {
                for cp in &cps {
                    let filter = SchoolFilter {
                        region: region.clone(),
                        cp: cp.clone(),
                    };
                    self.sync_scope(&prepared, &filter, now, affected).await?;
                }
            }

            info!(rule_id = prepared.id, affected = *affected, "Rule end");
        }
        Ok(())
    }

    async fn sync_scope(
        &self,
        rule: &PreparedRule,
        filter: &SchoolFilter,
        now: NaiveDateTime,
        affected: &mut u64,
    ) -> crate::error::Result<()> {
        let mut offset = 0;
        loop {
            let (page, total) = self.schools.schools(filter, self.page_size, offset).await?;
            if page.is_empty() {
                break;
            }
            debug!(?filter, offset, got = page.len(), total, "Fetched school page");

            for school in &page {
                if self.sync_school(rule, school, now).await? {
                    *affected += 1;
                }
            }

            offset += page.len() as u64;
            if offset >= total {
                break;
            }
        }
        Ok(())
    }

    async fn sync_school(
        &self,
        rule: &PreparedRule,
        school: &school::Model,
        now: NaiveDateTime,
    ) -> crate::error::Result<bool> {
        let existing = self
            .rates
            .find_customer_rate(&school.region, &school.cp, &school.school_name)
            .await?;
        let current = existing.as_ref().map(CurrentRate::from).unwrap_or_default();

        let Some(mut patch) = apply_rule(rule, &current) else {
            return Ok(false);
        };

        match existing {
            Some(row) => {
                debug!(rate_id = row.id, school = %school.school_name, "Updating rate row");
                patch.last_sync_time = Some(now);
                patch.last_sync_rule_id = Some(rule.id);
                self.rates.update_customer_rate(row.id, patch).await?;
            }
            None => {
                debug!(school = %school.school_name, region = %school.region, cp = %school.cp, "Creating rate row");
                self.rates
                    .insert_customer_rate(NewRateCustomer {
                        region: school.region.clone(),
                        cp: school.cp.clone(),
                        school_name: school.school_name.clone(),
                        customer_fee: patch.customer_fee,
                        network_line_fee: patch.network_line_fee,
                        general_fee: patch.general_fee,
                        fee_mode: FeeMode::Auto,
                        extra: patch.extra.unwrap_or_else(|| Value::Object(Map::new())),
                        last_sync_time: Some(now),
                        last_sync_rule_id: Some(rule.id),
                    })
                    .await?;
            }
        }
        Ok(true)
    }
}

/// Empty scope is a wildcard
fn scope(values: &[String]) -> Vec<Option<String>> {
    if values.is_empty() {
        vec![None]
    } else {
        values.iter().cloned().map(Some).collect()
    }
}

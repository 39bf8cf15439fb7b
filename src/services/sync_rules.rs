//! Rate sync rule management

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::entities::rate_customer_sync_rules;
use crate::error::{Result, SettlementError};
use crate::models::rates::{
    NewSyncRule, OverwriteStrategy, SyncRuleInput, SyncRulePatch, SyncRuleUpdate,
};
use crate::services::customer_fields::is_valid_field_key;
use crate::store::SyncRuleStore;

fn parse_strategy(raw: &str) -> Result<OverwriteStrategy> {
    OverwriteStrategy::from_str(&raw.trim().to_lowercase())
        .ok_or_else(|| SettlementError::validation("invalid overwrite_strategy"))
}

fn normalize_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SettlementError::validation("name is required"));
    }
    Ok(name.to_string())
}

/// `null` is treated as absent; anything else must be an array of strings
fn string_array(field: &str, value: Option<Value>) -> Result<Option<Value>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => {
            Ok(Some(Value::Array(items)))
        }
        Some(_) => Err(SettlementError::validation(format!(
            "{} must be a JSON array of strings",
            field
        ))),
    }
}

fn whitelist(value: Option<Value>) -> Result<Option<Value>> {
    let value = string_array("fields_to_update", value)?;
    if let Some(Value::Array(keys)) = &value {
        if keys
            .iter()
            .filter_map(Value::as_str)
            .any(|k| !is_valid_field_key(k))
        {
            return Err(SettlementError::validation(
                "fields_to_update contains invalid field_key",
            ));
        }
    }
    Ok(value)
}

fn actions(value: Value) -> Result<Value> {
    match &value {
        Value::Object(map) if !map.is_empty() => Ok(value),
        Value::Object(_) | Value::Null => Err(SettlementError::validation("actions cannot be empty")),
        _ => Err(SettlementError::validation("actions must be a JSON object")),
    }
}

fn check_id(id: i64) -> Result<()> {
    if id <= 0 {
        return Err(SettlementError::validation("invalid id"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct SyncRuleService {
    store: Arc<dyn SyncRuleStore>,
}

impl SyncRuleService {
    pub fn new(store: Arc<dyn SyncRuleStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<rate_customer_sync_rules::Model>> {
        self.store.list_rules().await
    }

    pub async fn get(&self, id: i64) -> Result<rate_customer_sync_rules::Model> {
        check_id(id)?;
        self.store
            .rule(id)
            .await?
            .ok_or_else(|| SettlementError::not_found(format!("sync rule {}", id)))
    }

    pub async fn create(&self, input: SyncRuleInput) -> Result<rate_customer_sync_rules::Model> {
        if input.priority < 0 {
            return Err(SettlementError::validation("priority must be >= 0"));
        }
        let rule = NewSyncRule {
            name: normalize_name(&input.name)?,
            enabled: input.enabled,
            priority: input.priority,
            overwrite_strategy: parse_strategy(&input.overwrite_strategy)?,
            scope_region: string_array("scope_region", input.scope_region)?,
            scope_cp: string_array("scope_cp", input.scope_cp)?,
            fields_to_update: whitelist(input.fields_to_update)?,
            actions: actions(input.actions)?,
        };
        let created = self.store.create_rule(rule).await?;
        info!(rule_id = created.id, name = %created.name, "Created sync rule");
        Ok(created)
    }

    /// General update; `enabled` and `priority` have dedicated operations
    pub async fn update(
        &self,
        id: i64,
        update: SyncRuleUpdate,
    ) -> Result<rate_customer_sync_rules::Model> {
        check_id(id)?;
        if update.enabled.is_some() {
            return Err(SettlementError::validation(
                "enabled cannot be updated here; use the enable endpoint",
            ));
        }
        if update.priority.is_some() {
            return Err(SettlementError::validation(
                "priority cannot be updated here; use the priority endpoint",
            ));
        }

        let patch = SyncRulePatch {
            name: update.name.as_deref().map(normalize_name).transpose()?,
            overwrite_strategy: update
                .overwrite_strategy
                .as_deref()
                .map(parse_strategy)
                .transpose()?,
            scope_region: string_array("scope_region", update.scope_region)?,
            scope_cp: string_array("scope_cp", update.scope_cp)?,
            fields_to_update: whitelist(update.fields_to_update)?,
            actions: update.actions.map(actions).transpose()?,
            ..Default::default()
        };
        if patch == SyncRulePatch::default() {
            return Err(SettlementError::validation("no fields to update"));
        }
        self.apply(id, patch).await
    }

    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<rate_customer_sync_rules::Model> {
        check_id(id)?;
        let patch = SyncRulePatch {
            enabled: Some(enabled),
            ..Default::default()
        };
        self.apply(id, patch).await
    }

    pub async fn update_priority(
        &self,
        id: i64,
        priority: i32,
    ) -> Result<rate_customer_sync_rules::Model> {
        check_id(id)?;
        if priority < 0 {
            return Err(SettlementError::validation("priority must be >= 0"));
        }
        let patch = SyncRulePatch {
            priority: Some(priority),
            ..Default::default()
        };
        self.apply(id, patch).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        check_id(id)?;
        if !self.store.delete_rule(id).await? {
            return Err(SettlementError::not_found(format!("sync rule {}", id)));
        }
        info!(rule_id = id, "Deleted sync rule");
        Ok(())
    }

    async fn apply(&self, id: i64, patch: SyncRulePatch) -> Result<rate_customer_sync_rules::Model> {
        let rule = self
            .store
            .update_rule(id, patch)
            .await?
            .ok_or_else(|| SettlementError::not_found(format!("sync rule {}", id)))?;
        info!(rule_id = id, enabled = rule.enabled, priority = rule.priority, "Updated sync rule");
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn service() -> SyncRuleService {
        SyncRuleService::new(Arc::new(MemoryStore::new()))
    }

    fn input(body: Value) -> SyncRuleInput {
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn test_create_normalizes() {
        let rule = service()
            .create(input(json!({
                "name": "  east fees ",
                "overwrite_strategy": " IF_EMPTY ",
                "scope_region": ["east"],
                "actions": {"set": {"customer_fee": 10}}
            })))
            .await
            .unwrap();
        assert_eq!(rule.name, "east fees");
        assert_eq!(rule.overwrite_strategy, "if_empty");
        assert!(rule.enabled);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let svc = service();
        let cases = [
            json!({"name": " ", "actions": {"set": {"a1": 1}}}),
            json!({"name": "r", "overwrite_strategy": "never", "actions": {"set": {"a1": 1}}}),
            json!({"name": "r", "scope_cp": "telecom", "actions": {"set": {"a1": 1}}}),
            json!({"name": "r", "fields_to_update": ["Bad-Key"], "actions": {"set": {"a1": 1}}}),
            json!({"name": "r", "actions": {}}),
            json!({"name": "r", "actions": [1]}),
            json!({"name": "r", "priority": -1, "actions": {"set": {"a1": 1}}}),
        ];
        for case in cases {
            let err = svc.create(input(case.clone())).await.unwrap_err();
            assert!(matches!(err, SettlementError::Validation(_)), "{}", case);
        }
    }

    #[tokio::test]
    async fn test_update_rejects_enabled_and_priority() {
        let svc = service();
        let rule = svc
            .create(input(json!({"name": "r", "actions": {"set": {"a1": 1}}})))
            .await
            .unwrap();

        let update = SyncRuleUpdate {
            enabled: Some(false),
            ..Default::default()
        };
        assert!(svc.update(rule.id, update).await.is_err());
        let update = SyncRuleUpdate {
            priority: Some(3),
            ..Default::default()
        };
        assert!(svc.update(rule.id, update).await.is_err());

        let disabled = svc.set_enabled(rule.id, false).await.unwrap();
        assert!(!disabled.enabled);
        let moved = svc.update_priority(rule.id, 7).await.unwrap();
        assert_eq!(moved.priority, 7);
        assert!(svc.update_priority(rule.id, -1).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_and_invalid_ids() {
        let svc = service();
        assert!(matches!(svc.delete(0).await, Err(SettlementError::Validation(_))));
        assert!(matches!(svc.delete(99).await, Err(SettlementError::NotFound(_))));
        assert!(matches!(
            svc.set_enabled(99, true).await,
            Err(SettlementError::NotFound(_))
        ));
    }
}

//! Customer rate, sync rule and custom field models

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::rate_customer;
use crate::error::{Result, SettlementError};

pub const DEFAULT_RATE_PAGE_SIZE: u64 = 10;

/// Top-level fee columns on a rate row; every other key lives in `extra`
pub const TOP_LEVEL_FEE_FIELDS: [&str; 3] = ["customer_fee", "network_line_fee", "general_fee"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeMode {
    /// Maintained by rate sync
    Auto,
    /// Entered by an operator; sync never touches the fee columns
    Configed,
}

impl FeeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeMode::Auto => "auto",
            FeeMode::Configed => "configed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(FeeMode::Auto),
            "configed" => Some(FeeMode::Configed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteStrategy {
    Always,
    IfEmpty,
}

impl OverwriteStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverwriteStrategy::Always => "always",
            OverwriteStrategy::IfEmpty => "if_empty",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "always" => Some(OverwriteStrategy::Always),
            "if_empty" => Some(OverwriteStrategy::IfEmpty),
            _ => None,
        }
    }
}

/// Directory paging filter; `None` matches every value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchoolFilter {
    pub region: Option<String>,
    pub cp: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRateCustomer {
    pub region: String,
    pub cp: String,
    pub school_name: String,
    pub customer_fee: Option<f64>,
    pub network_line_fee: Option<f64>,
    pub general_fee: Option<f64>,
    pub fee_mode: FeeMode,
    pub extra: Value,
    pub last_sync_time: Option<NaiveDateTime>,
    pub last_sync_rule_id: Option<i64>,
}

/// Partial update; `None` leaves the column untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateCustomerPatch {
    pub customer_fee: Option<f64>,
    pub network_line_fee: Option<f64>,
    pub general_fee: Option<f64>,
    pub fee_mode: Option<FeeMode>,
    pub extra: Option<Value>,
    pub last_sync_time: Option<NaiveDateTime>,
    pub last_sync_rule_id: Option<i64>,
}

impl RateCustomerPatch {
    pub fn set_fee(&mut self, key: &str, value: f64) {
        match key {
            "customer_fee" => self.customer_fee = Some(value),
            "network_line_fee" => self.network_line_fee = Some(value),
            "general_fee" => self.general_fee = Some(value),
            _ => {}
        }
    }
}

/// Rate listing filter; every field matches exactly
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerRateFilter {
    pub region: Option<String>,
    pub cp: Option<String>,
    pub school_name: Option<String>,
}

/// Query string for GET /api/rates/customer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerRateQuery {
    pub region: Option<String>,
    pub cp: Option<String>,
    pub school_name: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl CustomerRateQuery {
    /// Filter plus (limit, offset); pages start at 1
    pub fn into_filter(self) -> (CustomerRateFilter, u64, u64) {
        let trimmed = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        let page_size = self
            .page_size
            .filter(|p| *p > 0)
            .unwrap_or(DEFAULT_RATE_PAGE_SIZE);
        let filter = CustomerRateFilter {
            region: trimmed(self.region),
            cp: trimmed(self.cp),
            school_name: trimmed(self.school_name),
        };
        (filter, page_size, (page - 1) * page_size)
    }
}

/// Operator write keyed by (region, cp, school_name).
/// Absent fields leave the stored value as it is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerRateUpsert {
    pub region: String,
    pub cp: String,
    pub school_name: String,
    pub customer_fee: Option<f64>,
    pub network_line_fee: Option<f64>,
    pub general_fee: Option<f64>,
    pub fee_mode: Option<String>,
    pub extra: Option<Value>,
}

impl CustomerRateUpsert {
    /// Trimmed key, parsed fee mode and the patch to apply
    pub fn validate(self) -> Result<(String, String, String, RateCustomerPatch)> {
        let region = self.region.trim().to_string();
        let cp = self.cp.trim().to_string();
        let school_name = self.school_name.trim().to_string();
        if region.is_empty() || cp.is_empty() || school_name.is_empty() {
            return Err(SettlementError::validation(
                "region, cp and school_name are required",
            ));
        }

        let fee_mode = match self.fee_mode.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(FeeMode::from_str(&raw.to_lowercase()).ok_or_else(|| {
                SettlementError::validation(format!("unknown fee_mode {:?}", raw))
            })?),
        };
        if let Some(extra) = &self.extra {
            if !extra.is_object() {
                return Err(SettlementError::validation("extra must be a JSON object"));
            }
        }

        let patch = RateCustomerPatch {
            customer_fee: self.customer_fee,
            network_line_fee: self.network_line_fee,
            general_fee: self.general_fee,
            fee_mode,
            extra: self.extra,
            ..Default::default()
        };
        Ok((region, cp, school_name, patch))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerRatePage {
    pub items: Vec<rate_customer::Model>,
    pub total: u64,
}

/// Create payload for a sync rule
#[derive(Debug, Clone, Deserialize)]
pub struct SyncRuleInput {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub scope_region: Option<Value>,
    #[serde(default)]
    pub scope_cp: Option<Value>,
    #[serde(default)]
    pub fields_to_update: Option<Value>,
    #[serde(default = "default_strategy")]
    pub overwrite_strategy: String,
    pub actions: Value,
}

/// General update payload. `enabled` and `priority` are rejected here and
/// have their own operations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRuleUpdate {
    pub name: Option<String>,
    pub overwrite_strategy: Option<String>,
    pub scope_region: Option<Value>,
    pub scope_cp: Option<Value>,
    pub fields_to_update: Option<Value>,
    pub actions: Option<Value>,
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
}

/// Store-level rule insert, already validated
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncRule {
    pub name: String,
    pub enabled: bool,
    pub priority: i32,
    pub scope_region: Option<Value>,
    pub scope_cp: Option<Value>,
    pub fields_to_update: Option<Value>,
    pub overwrite_strategy: OverwriteStrategy,
    pub actions: Value,
}

/// Store-level rule patch, already validated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncRulePatch {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
    pub scope_region: Option<Value>,
    pub scope_cp: Option<Value>,
    pub fields_to_update: Option<Value>,
    pub overwrite_strategy: Option<OverwriteStrategy>,
    pub actions: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePriorityRequest {
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDataType {
    String,
    Number,
    Integer,
    Boolean,
}

impl FieldDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldDataType::String => "string",
            FieldDataType::Number => "number",
            FieldDataType::Integer => "integer",
            FieldDataType::Boolean => "boolean",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "string" => Some(FieldDataType::String),
            "number" => Some(FieldDataType::Number),
            "integer" => Some(FieldDataType::Integer),
            "boolean" => Some(FieldDataType::Boolean),
            _ => None,
        }
    }
}

/// Create payload for a custom field definition
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDefInput {
    pub field_key: String,
    pub label: String,
    pub data_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub usable_in_rules: bool,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub enum_options: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateSyncResponse {
    pub affected: u64,
}

fn default_true() -> bool {
    true
}

fn default_strategy() -> String {
    OverwriteStrategy::Always.as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_mode_round_trip() {
        assert_eq!(FeeMode::from_str("configed"), Some(FeeMode::Configed));
        assert_eq!(FeeMode::from_str("manual"), None);
        assert_eq!(FeeMode::Auto.as_str(), "auto");
    }

    #[test]
    fn test_patch_set_fee_ignores_unknown_keys() {
        let mut patch = RateCustomerPatch::default();
        patch.set_fee("general_fee", 2.0);
        patch.set_fee("remark", 1.0);
        assert_eq!(patch.general_fee, Some(2.0));
        assert_eq!(patch.customer_fee, None);
        assert_eq!(patch.extra, None);
    }

    #[test]
    fn test_rate_query_paging() {
        let query = CustomerRateQuery {
            region: Some(" east ".into()),
            cp: Some("".into()),
            page: Some(3),
            page_size: Some(20),
            ..Default::default()
        };
        let (filter, limit, offset) = query.into_filter();
        assert_eq!(filter.region.as_deref(), Some("east"));
        assert_eq!(filter.cp, None);
        assert_eq!((limit, offset), (20, 40));

        let (_, limit, offset) = CustomerRateQuery::default().into_filter();
        assert_eq!((limit, offset), (DEFAULT_RATE_PAGE_SIZE, 0));
    }

    #[test]
    fn test_rate_upsert_validation() {
        let upsert = |fee_mode: &str| CustomerRateUpsert {
            region: "east".into(),
            cp: "telecom".into(),
            school_name: " School A ".into(),
            customer_fee: Some(5.0),
            fee_mode: Some(fee_mode.into()),
            ..Default::default()
        };

        let (_, _, school_name, patch) = upsert("Configed").validate().unwrap();
        assert_eq!(school_name, "School A");
        assert_eq!(patch.fee_mode, Some(FeeMode::Configed));
        assert_eq!(patch.customer_fee, Some(5.0));
        assert_eq!(patch.general_fee, None);

        assert!(upsert("manual").validate().is_err());
        let mut missing_key = upsert("auto");
        missing_key.cp = " ".into();
        assert!(missing_key.validate().is_err());
        let mut bad_extra = upsert("auto");
        bad_extra.extra = Some(Value::from(3));
        assert!(bad_extra.validate().is_err());
    }

    #[test]
    fn test_rule_input_defaults() {
        let input: SyncRuleInput =
            serde_json::from_str(r#"{"name": "r", "actions": {"set": {"a1": 1}}}"#).unwrap();
        assert!(input.enabled);
        assert_eq!(input.priority, 0);
        assert_eq!(input.overwrite_strategy, "always");
    }
}

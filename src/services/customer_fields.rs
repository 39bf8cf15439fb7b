//! Registered schema for the rate row's extra bag

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::info;

use crate::entities::rate_customer_field_defs;
use crate::error::{Result, SettlementError};
use crate::models::rates::{FieldDataType, FieldDefInput};
use crate::store::FieldSchemaStore;

lazy_static! {
    static ref FIELD_KEY_REGEX: Regex = Regex::new(r"^[a-z][a-z0-9_]{1,63}$").unwrap();
}

pub fn is_valid_field_key(key: &str) -> bool {
    FIELD_KEY_REGEX.is_match(key)
}

/// JSON type check; integers must have no fractional part
pub fn value_matches_type(value: &Value, data_type: FieldDataType) -> bool {
    match data_type {
        FieldDataType::String => value.is_string(),
        FieldDataType::Boolean => value.is_boolean(),
        FieldDataType::Number => value.is_number(),
        FieldDataType::Integer => value.as_f64().is_some_and(|f| f.trunc() == f),
    }
}

/// Normalizes `input` in place and checks the definition is self-consistent
pub fn validate_field_def(input: &mut FieldDefInput) -> Result<FieldDataType> {
    input.field_key = input.field_key.trim().to_string();
    input.label = input.label.trim().to_string();
    input.data_type = input.data_type.trim().to_lowercase();

    if input.label.is_empty() {
        return Err(SettlementError::validation("label is required"));
    }
    if input.field_key.is_empty() {
        return Err(SettlementError::validation("field_key is required"));
    }
    if !is_valid_field_key(&input.field_key) {
        return Err(SettlementError::validation(
            "field_key must match ^[a-z][a-z0-9_]{1,63}$",
        ));
    }
    let data_type = FieldDataType::from_str(&input.data_type)
        .ok_or_else(|| SettlementError::validation("invalid data_type"))?;

    let numeric = matches!(data_type, FieldDataType::Number | FieldDataType::Integer);
    if (input.min.is_some() || input.max.is_some()) && !numeric {
        return Err(SettlementError::validation(
            "min/max only allowed for number/integer",
        ));
    }
    if let (Some(min), Some(max)) = (input.min, input.max) {
        if min > max {
            return Err(SettlementError::validation("min cannot be greater than max"));
        }
    }

    if let Some(options) = &input.enum_options {
        let values = options
            .as_array()
            .ok_or_else(|| SettlementError::validation("enum_options must be a JSON array"))?;
        if values.iter().any(|v| !value_matches_type(v, data_type)) {
            return Err(SettlementError::validation(
                "enum_options elements type mismatch with data_type",
            ));
        }
        let mut seen = HashSet::new();
        if !values.iter().all(|v| seen.insert(v.to_string())) {
            return Err(SettlementError::validation("enum_options has duplicate values"));
        }
    }

    Ok(data_type)
}

/// Lookup of registered definitions used to screen rule-driven extra writes
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    defs: HashMap<String, rate_customer_field_defs::Model>,
}

impl FieldSchema {
    pub fn new(defs: Vec<rate_customer_field_defs::Model>) -> Self {
        Self {
            defs: defs.into_iter().map(|d| (d.field_key.clone(), d)).collect(),
        }
    }

    /// Why `value` may not be written to `key` by a rule, `None` if it may
    pub fn rejection(&self, key: &str, value: &Value) -> Option<String> {
        let Some(def) = self.defs.get(key) else {
            return Some("field is not registered".to_string());
        };
        if !def.enabled {
            return Some("field is disabled".to_string());
        }
        if !def.usable_in_rules {
            return Some("field is not usable in rules".to_string());
        }
        let Some(data_type) = FieldDataType::from_str(&def.data_type) else {
            return Some(format!("field has unknown data_type {}", def.data_type));
        };
        if !value_matches_type(value, data_type) {
            return Some(format!("value is not a {}", data_type.as_str()));
        }
        if let Some(n) = value.as_f64() {
            if def.min.is_some_and(|min| n < min) {
                return Some("value is below min".to_string());
            }
            if def.max.is_some_and(|max| n > max) {
                return Some("value is above max".to_string());
            }
        }
        if let Some(Value::Array(options)) = &def.enum_options {
            if !options.is_empty() && !options.contains(value) {
                return Some("value is not one of enum_options".to_string());
            }
        }
        None
    }
}

#[derive(Clone)]
pub struct CustomerFieldService {
    store: Arc<dyn FieldSchemaStore>,
}

impl CustomerFieldService {
    pub fn new(store: Arc<dyn FieldSchemaStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<rate_customer_field_defs::Model>> {
        self.store.field_defs().await
    }

    pub async fn create(&self, mut input: FieldDefInput) -> Result<rate_customer_field_defs::Model> {
        validate_field_def(&mut input)?;
        let existing = self.store.field_defs().await?;
        if existing.iter().any(|d| d.field_key == input.field_key) {
            return Err(SettlementError::validation("field_key already exists"));
        }
        let def = self.store.create_field_def(input).await?;
        info!(field_key = %def.field_key, data_type = %def.data_type, "Registered customer field");
        Ok(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn input(key: &str, data_type: &str) -> FieldDefInput {
        FieldDefInput {
            field_key: key.to_string(),
            label: "Label".to_string(),
            data_type: data_type.to_string(),
            enabled: true,
            usable_in_rules: true,
            min: None,
            max: None,
            enum_options: None,
        }
    }

    fn def(key: &str, data_type: &str) -> rate_customer_field_defs::Model {
        let at = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        rate_customer_field_defs::Model {
            id: 1,
            field_key: key.to_string(),
            label: key.to_string(),
            data_type: data_type.to_string(),
            enabled: true,
            usable_in_rules: true,
            min: None,
            max: None,
            enum_options: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_field_key_pattern() {
        assert!(is_valid_field_key("port_fee"));
        assert!(is_valid_field_key("a1"));
        assert!(!is_valid_field_key("a"));
        assert!(!is_valid_field_key("1abc"));
        assert!(!is_valid_field_key("Port_fee"));
        assert!(!is_valid_field_key(&"a".repeat(65)));
    }

    #[test]
    fn test_validate_normalizes() {
        let mut i = input(" port_fee ", " NUMBER ");
        assert_eq!(validate_field_def(&mut i).unwrap(), FieldDataType::Number);
        assert_eq!(i.field_key, "port_fee");
        assert_eq!(i.data_type, "number");
    }

    #[test]
    fn test_validate_rejects_inconsistent_defs() {
        let mut range_on_string = input("remark", "string");
        range_on_string.min = Some(1.0);
        assert!(validate_field_def(&mut range_on_string).is_err());

        let mut inverted = input("port_fee", "number");
        inverted.min = Some(5.0);
        inverted.max = Some(1.0);
        assert!(validate_field_def(&mut inverted).is_err());

        let mut dup_enum = input("tier", "string");
        dup_enum.enum_options = Some(json!(["a", "a"]));
        assert!(validate_field_def(&mut dup_enum).is_err());

        let mut mixed_enum = input("level", "integer");
        mixed_enum.enum_options = Some(json!([1, 2.5]));
        assert!(validate_field_def(&mut mixed_enum).is_err());

        assert!(validate_field_def(&mut input("port_fee", "decimal")).is_err());
    }

    #[test]
    fn test_schema_rejections() {
        let mut ranged = def("port_fee", "number");
        ranged.min = Some(0.0);
        ranged.max = Some(100.0);
        let mut disabled = def("old_fee", "number");
        disabled.enabled = false;
        let mut tier = def("tier", "string");
        tier.enum_options = Some(json!(["gold", "silver"]));
        let schema = FieldSchema::new(vec![ranged, disabled, tier, def("seats", "integer")]);

        assert_eq!(schema.rejection("port_fee", &json!(12.5)), None);
        assert!(schema.rejection("port_fee", &json!(120)).is_some());
        assert!(schema.rejection("port_fee", &json!("12")).is_some());
        assert!(schema.rejection("old_fee", &json!(1)).is_some());
        assert!(schema.rejection("unknown", &json!(1)).is_some());
        assert_eq!(schema.rejection("tier", &json!("gold")), None);
        assert!(schema.rejection("tier", &json!("bronze")).is_some());
        assert_eq!(schema.rejection("seats", &json!(3)), None);
        assert!(schema.rejection("seats", &json!(3.5)).is_some());
    }
}

//! Daily settlement values and cached settlement result models

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::entities::{school_settlement, settlement_results};
use crate::error::{Result, SettlementError};

pub const DEFAULT_RESULT_LIMIT: u64 = 50;
pub const CURRENCY_CNY: &str = "CNY";
pub const ROUNDING_MODE_HALF_UP: &str = "HALF_UP";
pub const ROUNDING_SCALE: u32 = 2;

/// Parse a `YYYY-MM-DD` request parameter
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        SettlementError::validation(format!("{} must be a date in YYYY-MM-DD format", field))
    })
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Percentile value ready to be upserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewDailySettlement {
    pub school_id: String,
    pub school_name: String,
    pub region: String,
    pub cp: String,
    pub value: i64,
    pub sample_time: NaiveDateTime,
    pub date: NaiveDate,
}

/// Range filter over daily values. `school_name` is a substring match.
#[derive(Debug, Clone)]
pub struct DailySettlementFilter {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub region: Option<String>,
    pub cp: Option<String>,
    pub school_id: Option<String>,
    pub school_name: Option<String>,
}

impl DailySettlementFilter {
    pub fn matches(&self, row: &school_settlement::Model) -> bool {
        row.settlement_date >= self.start_date
            && row.settlement_date <= self.end_date
            && self.region.as_ref().is_none_or(|r| &row.region == r)
            && self.cp.as_ref().is_none_or(|c| &row.cp == c)
            && self.school_id.as_ref().is_none_or(|s| &row.school_id == s)
            && self
                .school_name
                .as_ref()
                .is_none_or(|n| row.school_name.contains(n.as_str()))
    }
}

/// Daily values summed per (region, cp, school) with the current rate row joined in
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregatedFlow {
    pub region: String,
    pub cp: String,
    pub school_id: String,
    pub school_name: String,
    pub day_count: i64,
    pub total_flow: f64,
    pub customer_fee: Option<f64>,
    pub network_line_fee: Option<f64>,
    pub general_fee: Option<f64>,
    pub node_deduction_fee: Option<f64>,
    pub final_fee: Option<f64>,
    /// Numeric keys of the rate row's extra bag
    pub extra_numbers: BTreeMap<String, f64>,
}

impl AggregatedFlow {
    /// Fills fee fields from a rate row's extra bag
    pub fn apply_extra(&mut self, extra: &Value) {
        let Some(map) = extra.as_object() else {
            return;
        };
        for (key, value) in map {
            if let Some(n) = json_number(value) {
                self.extra_numbers.insert(key.clone(), n);
            }
        }
        self.node_deduction_fee = self.extra_numbers.get("node_deduction_fee").copied();
        self.final_fee = self.extra_numbers.get("final_fee").copied();
    }
}

/// Numbers and numeric strings; anything else is not a number
pub fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Query parameters for GET /api/settlement/results
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettlementResultQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub region: Option<String>,
    pub cp: Option<String>,
    pub school_id: Option<String>,
    pub school_name: Option<String>,
    pub formula_id: Option<i64>,
    pub unit_base: Option<u32>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SettlementResultQuery {
    pub fn into_filter(self) -> Result<SettlementResultFilter> {
        let start_date = non_empty(self.start_date)
            .map(|s| parse_date("start_date", &s))
            .transpose()?;
        let end_date = non_empty(self.end_date)
            .map(|s| parse_date("end_date", &s))
            .transpose()?;

        Ok(SettlementResultFilter {
            start_date,
            end_date,
            region: non_empty(self.region),
            cp: non_empty(self.cp),
            school_id: non_empty(self.school_id),
            school_name: non_empty(self.school_name),
            formula_id: self.formula_id.filter(|id| *id > 0),
            unit_base: self.unit_base,
            limit: self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_RESULT_LIMIT),
            offset: self.offset.unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SettlementResultFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub region: Option<String>,
    pub cp: Option<String>,
    pub school_id: Option<String>,
    pub school_name: Option<String>,
    pub formula_id: Option<i64>,
    pub unit_base: Option<u32>,
    pub limit: u64,
    pub offset: u64,
}

impl Default for SettlementResultFilter {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            region: None,
            cp: None,
            school_id: None,
            school_name: None,
            formula_id: None,
            unit_base: None,
            limit: DEFAULT_RESULT_LIMIT,
            offset: 0,
        }
    }
}

impl SettlementResultFilter {
    pub fn for_range(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
            ..Default::default()
        }
    }

    /// Exact start/end match plus the optional filters
    pub fn matches(&self, row: &settlement_results::Model) -> bool {
        self.start_date.is_none_or(|d| row.start_date == d)
            && self.end_date.is_none_or(|d| row.end_date == d)
            && self.region.as_ref().is_none_or(|r| &row.region == r)
            && self.cp.as_ref().is_none_or(|c| &row.cp == c)
            && self.school_id.as_ref().is_none_or(|s| &row.school_id == s)
            && self
                .school_name
                .as_ref()
                .is_none_or(|n| row.school_name.contains(n.as_str()))
            && self.formula_id.is_none_or(|f| row.formula_id == f)
    }
}

/// Row written by the aggregator; identity is (region, cp, school_id, start_date, end_date)
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementResultUpsert {
    pub formula_id: i64,
    pub formula_name: String,
    pub formula_tokens: Value,
    pub region: String,
    pub cp: String,
    pub school_id: String,
    pub school_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub billing_days: i32,
    pub total_95_flow: f64,
    pub average_95_flow: f64,
    pub customer_fee: Option<f64>,
    pub network_line_fee: Option<f64>,
    pub general_fee: Option<f64>,
    pub node_deduction_fee: Option<f64>,
    pub final_fee: Option<f64>,
    pub amount: Decimal,
    pub amount_raw: f64,
    pub currency: String,
    pub missing_days: i32,
    pub missing_fields: Vec<String>,
    pub calculation_detail: Value,
}

/// Audit payload stored with every result. Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationDetail {
    pub average_95: f64,
    pub total_95: f64,
    pub average_95_bytes: f64,
    pub total_95_bytes: f64,
    pub average_95_converted: f64,
    pub total_95_converted: f64,
    pub converted_unit: String,
    pub unit_base: u32,
    pub customer_fee: f64,
    pub network_fee: f64,
    pub general_fee: f64,
    pub node_deduction: f64,
    pub final_fee: f64,
    /// Rounded amount, same value as the stored decimal column
    pub amount: f64,
    pub amount_raw: f64,
    pub rounding_mode: String,
    pub rounding_scale: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementResultItem {
    pub id: i64,
    pub region: String,
    pub cp: String,
    pub school_id: String,
    pub school_name: String,
    pub billing_days: i32,
    pub average_95_flow: f64,
    pub total_95_flow: f64,
    pub missing_days: i32,
    pub formula_id: i64,
    pub formula_name: String,
    pub formula_tokens: Value,
    pub customer_fee: f64,
    pub network_line_fee: f64,
    pub general_fee: f64,
    pub node_deduction_fee: f64,
    pub final_fee: f64,
    pub amount: f64,
    pub amount_raw: f64,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub updated_at: NaiveDateTime,
    pub missing_fields: Vec<String>,
    pub calculation_detail: Value,
}

impl From<settlement_results::Model> for SettlementResultItem {
    fn from(record: settlement_results::Model) -> Self {
        let missing_fields: Vec<String> =
            serde_json::from_value(record.missing_fields).unwrap_or_default();

        Self {
            id: record.id,
            region: record.region,
            cp: record.cp,
            school_id: record.school_id,
            school_name: record.school_name,
            billing_days: record.billing_days,
            average_95_flow: record.average_95_flow,
            total_95_flow: record.total_95_flow,
            missing_days: record.missing_days,
            formula_id: record.formula_id,
            formula_name: record.formula_name,
            formula_tokens: record.formula_tokens,
            customer_fee: record.customer_fee.unwrap_or(0.0),
            network_line_fee: record.network_line_fee.unwrap_or(0.0),
            general_fee: record.general_fee.unwrap_or(0.0),
            node_deduction_fee: record.node_deduction_fee.unwrap_or(0.0),
            final_fee: record.final_fee.unwrap_or(0.0),
            amount: record.amount.to_f64().unwrap_or(0.0),
            amount_raw: record.amount_raw,
            currency: record.currency,
            start_date: record.start_date,
            end_date: record.end_date,
            updated_at: record.updated_at,
            missing_fields,
            calculation_detail: record.calculation_detail,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementResultsResponse {
    pub items: Vec<SettlementResultItem>,
    pub total: u64,
}

/// Query parameters for POST /api/settlement/daily/calculate
#[derive(Debug, Clone, Deserialize)]
pub struct DailyCalculateQuery {
    pub date: Option<String>,
    pub school_id: Option<String>,
}

impl DailyCalculateQuery {
    pub fn validate(self) -> Result<(NaiveDate, String)> {
        let date = non_empty(self.date)
            .ok_or_else(|| SettlementError::validation("date is required"))?;
        let school_id = non_empty(self.school_id)
            .ok_or_else(|| SettlementError::validation("school_id is required"))?;
        Ok((parse_date("date", &date)?, school_id))
    }
}

/// Query parameters for GET /api/settlement/daily
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailyListQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub region: Option<String>,
    pub cp: Option<String>,
    pub school_id: Option<String>,
    pub school_name: Option<String>,
}

impl DailyListQuery {
    pub fn into_filter(self) -> Result<DailySettlementFilter> {
        let (Some(start), Some(end)) = (non_empty(self.start_date), non_empty(self.end_date)) else {
            return Err(SettlementError::validation(
                "start_date and end_date are required",
            ));
        };
        let start_date = parse_date("start_date", &start)?;
        let end_date = parse_date("end_date", &end)?;
        if end_date < start_date {
            return Err(SettlementError::validation(
                "end_date must not be before start_date",
            ));
        }
        Ok(DailySettlementFilter {
            start_date,
            end_date,
            region: non_empty(self.region),
            cp: non_empty(self.cp),
            school_id: non_empty(self.school_id),
            school_name: non_empty(self.school_name),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailySettlementResponse {
    pub date: NaiveDate,
    pub school_id: String,
    pub items: Vec<school_settlement::Model>,
}

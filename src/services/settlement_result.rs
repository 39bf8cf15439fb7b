//! Date-range billing aggregation with an idempotent result cache

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info};

use crate::config::normalize_unit_base;
use crate::entities::settlement_formulas;
use crate::error::{Result, SettlementError};
use crate::models::formula::{decode_tokens, FormulaToken};
use crate::models::settlement::{
    AggregatedFlow, CalculationDetail, DailySettlementFilter, SettlementResultFilter,
    SettlementResultItem, SettlementResultQuery, SettlementResultUpsert,
    SettlementResultsResponse, CURRENCY_CNY, ROUNDING_MODE_HALF_UP, ROUNDING_SCALE,
};
use crate::services::formula::{evaluate_rpn, to_rpn, FormulaService};
use crate::store::{DailySettlementStore, ResultStore};

pub const FIELD_FLOW_95: &str = "settlement_flow_95";
pub const FIELD_FLOW_TOTAL: &str = "settlement_flow_total";

/// Names the aggregator always owns; extra-bag keys never shadow them
const BUILTIN_FIELDS: [&str; 10] = [
    FIELD_FLOW_95,
    FIELD_FLOW_TOTAL,
    "customer_fee",
    "network_line_fee",
    "general_fee",
    "node_deduction_fee",
    "final_fee",
    "discount_rate",
    "tax_rate",
    "service_fee",
];

/// HALF_UP to two decimals, working from the shortest decimal form of `value`.
/// Values a `Decimal` cannot hold are a computation error.
pub fn round_half_up(value: f64) -> Result<Decimal> {
    if !value.is_finite() {
        return Err(SettlementError::computation(format!(
            "formula produced a non-finite amount: {}",
            value
        )));
    }
    Decimal::from_str(&value.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(value))
        .map(|d| d.round_dp_with_strategy(ROUNDING_SCALE, RoundingStrategy::MidpointAwayFromZero))
        .ok_or_else(|| {
            SettlementError::computation(format!("amount {} is out of range", value))
        })
}

fn unit_label(base: u32) -> &'static str {
    if base == 1000 { "GB" } else { "GiB" }
}

/// Formula environment for one aggregated row; absent fees stay absent
pub fn formula_env(flow: &AggregatedFlow, average_converted: f64, total_converted: f64) -> HashMap<String, f64> {
    let mut env: HashMap<String, f64> = flow
        .extra_numbers
        .iter()
        .filter(|(key, _)| !BUILTIN_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), *value))
        .collect();

    env.insert(FIELD_FLOW_95.to_string(), average_converted);
    env.insert(FIELD_FLOW_TOTAL.to_string(), total_converted);
    let fees = [
        ("customer_fee", flow.customer_fee),
        ("network_line_fee", flow.network_line_fee),
        ("general_fee", flow.general_fee),
        ("node_deduction_fee", flow.node_deduction_fee),
        ("final_fee", flow.final_fee),
    ];
    for (key, value) in fees {
        if let Some(v) = value {
            env.insert(key.to_string(), v);
        }
    }
    env.insert("discount_rate".to_string(), 1.0);
    env.insert("tax_rate".to_string(), 0.0);
    env.insert("service_fee".to_string(), 0.0);
    env
}

/// Resolved formula ready to be applied to many rows
struct PreparedFormula<'a> {
    formula: &'a settlement_formulas::Model,
    rpn: Vec<FormulaToken>,
}

struct Range {
    start: NaiveDate,
    end: NaiveDate,
    expected_days: i64,
    unit_base: u32,
}

fn build_record(
    prepared: &PreparedFormula<'_>,
    range: &Range,
    flow: AggregatedFlow,
) -> Result<SettlementResultUpsert> {
    let billing_days = flow.day_count;
    let missing_days = (range.expected_days - billing_days).max(0);
    let average = if billing_days > 0 {
        flow.total_flow / billing_days as f64
    } else {
        0.0
    };

    let denom = f64::from(range.unit_base).powi(3);
    let average_converted = average / denom;
    let total_converted = flow.total_flow / denom;

    let env = formula_env(&flow, average_converted, total_converted);
    let evaluation = evaluate_rpn(&prepared.rpn, &env)?;
    let amount = round_half_up(evaluation.value)?;

    let detail = CalculationDetail {
        average_95: average,
        total_95: flow.total_flow,
        average_95_bytes: average,
        total_95_bytes: flow.total_flow,
        average_95_converted: average_converted,
        total_95_converted: total_converted,
        converted_unit: unit_label(range.unit_base).to_string(),
        unit_base: range.unit_base,
        customer_fee: flow.customer_fee.unwrap_or(0.0),
        network_fee: flow.network_line_fee.unwrap_or(0.0),
        general_fee: flow.general_fee.unwrap_or(0.0),
        node_deduction: flow.node_deduction_fee.unwrap_or(0.0),
        final_fee: flow.final_fee.unwrap_or(0.0),
        amount: amount.to_f64().unwrap_or(0.0),
        amount_raw: evaluation.value,
        rounding_mode: ROUNDING_MODE_HALF_UP.to_string(),
        rounding_scale: ROUNDING_SCALE,
    };

    Ok(SettlementResultUpsert {
        formula_id: prepared.formula.id,
        formula_name: prepared.formula.name.clone(),
        formula_tokens: prepared.formula.tokens.clone(),
        region: flow.region,
        cp: flow.cp,
        school_id: flow.school_id,
        school_name: flow.school_name,
        start_date: range.start,
        end_date: range.end,
        billing_days: billing_days as i32,
        total_95_flow: flow.total_flow,
        average_95_flow: average,
        customer_fee: flow.customer_fee,
        network_line_fee: flow.network_line_fee,
        general_fee: flow.general_fee,
        node_deduction_fee: flow.node_deduction_fee,
        final_fee: flow.final_fee,
        amount,
        amount_raw: evaluation.value,
        currency: CURRENCY_CNY.to_string(),
        missing_days: missing_days as i32,
        missing_fields: evaluation.missing_fields.into_iter().collect(),
        calculation_detail: serde_json::to_value(&detail)?,
    })
}

#[derive(Clone)]
pub struct SettlementResultService {
    daily: Arc<dyn DailySettlementStore>,
    results: Arc<dyn ResultStore>,
    formulas: FormulaService,
    default_unit_base: u32,
}

impl SettlementResultService {
    pub fn new(
        daily: Arc<dyn DailySettlementStore>,
        results: Arc<dyn ResultStore>,
        formulas: FormulaService,
        default_unit_base: u32,
    ) -> Self {
        Self {
            daily,
            results,
            formulas,
            default_unit_base: normalize_unit_base(default_unit_base),
        }
    }

    /// Recompute every matching row for the range, cache it and return one page.
    /// Nothing is written when the formula cannot be resolved or evaluated.
    pub async fn calculate_results(
        &self,
        query: SettlementResultQuery,
    ) -> Result<SettlementResultsResponse> {
        let filter = query.into_filter()?;
        self.calculate_range(&filter).await?;
        self.page(&filter).await
    }

    /// Recompute and cache every row matching `filter`; returns rows written
    pub async fn calculate_range(&self, filter: &SettlementResultFilter) -> Result<usize> {
        let (start, end) = match (filter.start_date, filter.end_date) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(SettlementError::validation(
                    "start_date and end_date are required",
                ))
            }
        };
        if end < start {
            return Err(SettlementError::validation(
                "end_date must not be before start_date",
            ));
        }

        let formula = self.formulas.resolve(filter.formula_id).await?;
        let rpn = to_rpn(&decode_tokens(&formula.tokens)?)?;
        let prepared = PreparedFormula {
            formula: &formula,
            rpn,
        };
        let range = Range {
            start,
            end,
            expected_days: (end - start).num_days() + 1,
            unit_base: normalize_unit_base(filter.unit_base.unwrap_or(self.default_unit_base)),
        };

        let flows = self
            .daily
            .aggregate_flows(&DailySettlementFilter {
                start_date: start,
                end_date: end,
                region: filter.region.clone(),
                cp: filter.cp.clone(),
                school_id: filter.school_id.clone(),
                school_name: filter.school_name.clone(),
            })
            .await?;

        let records = flows
            .into_iter()
            .map(|flow| build_record(&prepared, &range, flow))
            .collect::<Result<Vec<_>>>()?;

        let computed = records.len();
        if !records.is_empty() {
            self.results.upsert_results(records).await?;
        }
        info!(
            formula_id = formula.id,
            %start,
            %end,
            unit_base = range.unit_base,
            computed,
            "Settlement results calculated"
        );
        Ok(computed)
    }

    /// Cached results only, no recomputation
    pub async fn list_results(
        &self,
        query: SettlementResultQuery,
    ) -> Result<SettlementResultsResponse> {
        let filter = query.into_filter()?;
        self.page(&filter).await
    }

    pub async fn delete_result(&self, id: i64) -> Result<()> {
        if id <= 0 {
            return Err(SettlementError::validation("invalid settlement result id"));
        }
        self.results.delete_result(id).await?;
        debug!(result_id = id, "Deleted settlement result");
        Ok(())
    }

    async fn page(&self, filter: &SettlementResultFilter) -> Result<SettlementResultsResponse> {
        let (rows, total) = self.results.list_results(filter).await?;
        Ok(SettlementResultsResponse {
            items: rows.into_iter().map(SettlementResultItem::from).collect(),
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(123.455).unwrap(), dec!(123.46));
        assert_eq!(round_half_up(123.444).unwrap(), dec!(123.44));
        assert_eq!(round_half_up(-1.005).unwrap(), dec!(-1.01));
        assert_eq!(round_half_up(0.0).unwrap(), dec!(0));
    }

    #[test]
    fn test_round_half_up_rejects_unrepresentable() {
        for value in [f64::NAN, f64::INFINITY, 1e300, -1e40] {
            let err = round_half_up(value).unwrap_err();
            assert!(matches!(err, SettlementError::Computation(_)), "{}", value);
        }
    }

    #[test]
    fn test_env_leaves_absent_fees_out() {
        let mut flow = AggregatedFlow {
            customer_fee: Some(3.0),
            ..Default::default()
        };
        flow.extra_numbers.insert("port_fee".into(), 7.0);
        flow.extra_numbers.insert("customer_fee".into(), 99.0);

        let env = formula_env(&flow, 1.5, 4.5);
        assert_eq!(env[FIELD_FLOW_95], 1.5);
        assert_eq!(env[FIELD_FLOW_TOTAL], 4.5);
        assert_eq!(env["customer_fee"], 3.0);
        assert_eq!(env["port_fee"], 7.0);
        assert_eq!(env["discount_rate"], 1.0);
        assert!(!env.contains_key("network_line_fee"));
        assert!(!env.contains_key("final_fee"));
    }

    #[test]
    fn test_unit_label() {
        assert_eq!(unit_label(1000), "GB");
        assert_eq!(unit_label(1024), "GiB");
    }
}

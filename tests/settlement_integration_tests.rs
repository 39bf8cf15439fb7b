mod common;

use rust_decimal_macros::dec;
use serde_json::{json, Value};
use settlement_backend::{
    error::SettlementError,
    models::{
        formula::FormulaInput,
        rates::{FeeMode, NewRateCustomer},
        settlement::{DailySettlementFilter, NewDailySettlement, SettlementResultQuery},
    },
    store::{DailySettlementStore, RateStore},
};

use crate::common::{at, date, setup_test_app, TestApp, CP, REGION};

fn field(name: &str) -> Value {
    json!({"type": "field", "value": name})
}

fn op(symbol: &str) -> Value {
    json!({"type": "operator", "value": symbol})
}

fn number(literal: &str) -> Value {
    json!({"type": "number", "value": literal})
}

async fn create_formula(app: &TestApp, name: &str, tokens: Vec<Value>) -> i64 {
    app.state
        .formulas
        .create(FormulaInput {
            name: name.to_string(),
            description: None,
            tokens: Value::Array(tokens),
            enabled: true,
            updated_by: Some("tests".to_string()),
        })
        .await
        .unwrap()
        .id
}

async fn record_day(app: &TestApp, school_id: &str, day: u32, value: i64) {
    let d = date(2025, 3, day);
    app.store
        .upsert_daily(NewDailySettlement {
            school_id: school_id.to_string(),
            school_name: format!("{} school", school_id),
            region: REGION.to_string(),
            cp: CP.to_string(),
            value,
            sample_time: at(d, 600),
            date: d,
        })
        .await
        .unwrap();
}

async fn add_rate(app: &TestApp, school_id: &str, customer_fee: f64) {
    app.store
        .insert_customer_rate(NewRateCustomer {
            region: REGION.to_string(),
            cp: CP.to_string(),
            school_name: format!("{} school", school_id),
            customer_fee: Some(customer_fee),
            network_line_fee: None,
            general_fee: None,
            fee_mode: FeeMode::Configed,
            extra: json!({}),
            last_sync_time: None,
            last_sync_rule_id: None,
        })
        .await
        .unwrap();
}

fn range_query(start: &str, end: &str) -> SettlementResultQuery {
    SettlementResultQuery {
        start_date: Some(start.to_string()),
        end_date: Some(end.to_string()),
        unit_base: Some(1000),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_daily_percentile_discards_top_five_percent() {
    let app = setup_test_app();
    let day = date(2025, 3, 3);
    app.seed_day("s1", "First school", day, &[100, 90, 80, 70, 60, 50, 40, 30, 20, 10]);

    let rows = app
        .state
        .percentile
        .calculate_daily(day, "s1", None, None)
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].settlement_value, 90);
    assert_eq!(rows[0].settlement_date, day);
    assert_eq!(rows[0].region, REGION);

    // Recomputing overwrites the natural key instead of adding a row
    app.state
        .percentile
        .calculate_daily(day, "s1", None, None)
        .await
        .unwrap();
    assert_eq!(app.store.daily_rows().len(), 1);
}

#[tokio::test]
async fn test_daily_unknown_school_is_not_found() {
    let app = setup_test_app();
    let err = app
        .state
        .percentile
        .calculate_daily(date(2025, 3, 3), "ghost", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::NotFound(_)));
}

#[tokio::test]
async fn test_range_with_missing_days() {
    let app = setup_test_app();
    create_formula(
        &app,
        "flow x fee",
        vec![field("settlement_flow_95"), op("*"), field("customer_fee")],
    )
    .await;
    add_rate(&app, "s1", 10.0).await;
    record_day(&app, "s1", 3, 1_000_000_000).await;
    record_day(&app, "s1", 4, 2_000_000_000).await;
    record_day(&app, "s1", 6, 3_000_000_000).await;

    let response = app
        .state
        .results
        .calculate_results(range_query("2025-03-03", "2025-03-07"))
        .await
        .unwrap();

    assert_eq!(response.total, 1);
    let item = &response.items[0];
    assert_eq!(item.billing_days, 3);
    assert_eq!(item.missing_days, 2);
    assert_eq!(item.total_95_flow, 6_000_000_000.0);
    assert_eq!(item.average_95_flow, item.total_95_flow / 3.0);
    assert_eq!(item.amount, 20.0);
    assert!(item.missing_fields.is_empty());
    assert_eq!(item.calculation_detail["converted_unit"], "GB");

    let stored = app.store.result_rows();
    assert_eq!(stored[0].amount, dec!(20.00));
}

#[tokio::test]
async fn test_recalculation_is_idempotent() {
    let app = setup_test_app();
    create_formula(
        &app,
        "with extras",
        vec![
            field("settlement_flow_total"),
            op("*"),
            field("customer_fee"),
            op("+"),
            field("port_fee"),
        ],
    )
    .await;
    add_rate(&app, "s1", 3.5).await;
    record_day(&app, "s1", 3, 1_500_000_000).await;
    record_day(&app, "s1", 4, 2_500_000_000).await;

    let first = app
        .state
        .results
        .calculate_results(range_query("2025-03-03", "2025-03-04"))
        .await
        .unwrap();
    let second = app
        .state
        .results
        .calculate_results(range_query("2025-03-03", "2025-03-04"))
        .await
        .unwrap();

    assert_eq!(app.store.result_rows().len(), 1);
    let (a, b) = (&first.items[0], &second.items[0]);
    assert_eq!(a.id, b.id);
    assert_eq!(a.amount, b.amount);
    assert_eq!(a.missing_fields, b.missing_fields);
    assert_eq!(a.calculation_detail, b.calculation_detail);
    assert_eq!(a.missing_fields, vec!["port_fee".to_string()]);
}

#[tokio::test]
async fn test_amount_rounds_half_up() {
    let app = setup_test_app();
    record_day(&app, "s1", 3, 1).await;

    let up = create_formula(&app, "up", vec![number("123.455")]).await;
    let mut query = range_query("2025-03-03", "2025-03-03");
    query.formula_id = Some(up);
    let response = app.state.results.calculate_results(query).await.unwrap();
    assert_eq!(response.items[0].amount, 123.46);
    assert_eq!(response.items[0].amount_raw, 123.455);
    assert_eq!(app.store.result_rows()[0].amount, dec!(123.46));

    // Same school and range under another formula replaces the cached row
    let down = create_formula(&app, "down", vec![number("123.444")]).await;
    let mut query = range_query("2025-03-03", "2025-03-03");
    query.formula_id = Some(down);
    app.state.results.calculate_results(query).await.unwrap();

    let rows = app.store.result_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].formula_id, down);
    assert_eq!(rows[0].amount, dec!(123.44));
}

#[tokio::test]
async fn test_results_without_formula() {
    let app = setup_test_app();
    record_day(&app, "s1", 3, 1).await;

    let err = app
        .state
        .results
        .calculate_results(range_query("2025-03-03", "2025-03-03"))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::NotFound(_)));

    let mut query = range_query("2025-03-03", "2025-03-03");
    query.formula_id = Some(42);
    let err = app.state.results.calculate_results(query).await.unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)));
    assert!(app.store.result_rows().is_empty());
}

#[tokio::test]
async fn test_results_require_ordered_range() {
    let app = setup_test_app();
    let err = app
        .state
        .results
        .calculate_results(range_query("2025-03-07", "2025-03-03"))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)));

    let err = app
        .state
        .results
        .calculate_results(SettlementResultQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)));
}

#[tokio::test]
async fn test_delete_result() {
    let app = setup_test_app();
    create_formula(&app, "flat", vec![number("1")]).await;
    record_day(&app, "s1", 3, 1).await;
    let response = app
        .state
        .results
        .calculate_results(range_query("2025-03-03", "2025-03-03"))
        .await
        .unwrap();

    app.state
        .results
        .delete_result(response.items[0].id)
        .await
        .unwrap();
    assert!(app.store.result_rows().is_empty());
    assert!(app.state.results.delete_result(0).await.is_err());

    // Daily values survive
    let filter = DailySettlementFilter {
        start_date: date(2025, 3, 3),
        end_date: date(2025, 3, 3),
        region: None,
        cp: None,
        school_id: None,
        school_name: None,
    };
    assert_eq!(app.store.list_daily(&filter).await.unwrap().len(), 1);
}

//! PgStore against a real database.
//!
//! Run with `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.
//! Every test writes under its own region and deletes it afterwards.

mod common;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;
use settlement_backend::{
    entities::{prelude::*, rate_customer, school_settlement, settlement_results},
    models::{
        rates::{CustomerRateFilter, FeeMode, NewRateCustomer, RateCustomerPatch},
        settlement::{
            DailySettlementFilter, NewDailySettlement, SettlementResultFilter,
            SettlementResultUpsert,
        },
    },
    store::{DailySettlementStore, PgStore, RateStore, ResultStore},
};

use crate::common::{at, date, setup_test_db, CP};

/// Region no other test run writes to
fn unique_region(label: &str) -> String {
    format!(
        "pg-{}-{}",
        label,
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

async fn cleanup(db: &DatabaseConnection, region: &str) {
    SchoolSettlement::delete_many()
        .filter(school_settlement::Column::Region.eq(region))
        .exec(db)
        .await
        .unwrap();
    SettlementResults::delete_many()
        .filter(settlement_results::Column::Region.eq(region))
        .exec(db)
        .await
        .unwrap();
    RateCustomer::delete_many()
        .filter(rate_customer::Column::Region.eq(region))
        .exec(db)
        .await
        .unwrap();
}

fn daily(region: &str, school_id: &str, day: u32, value: i64) -> NewDailySettlement {
    let d = date(2025, 3, day);
    NewDailySettlement {
        school_id: school_id.to_string(),
        school_name: format!("{} school", school_id),
        region: region.to_string(),
        cp: CP.to_string(),
        value,
        sample_time: at(d, 600),
        date: d,
    }
}

fn range_filter(region: &str, start: u32, end: u32) -> DailySettlementFilter {
    DailySettlementFilter {
        start_date: date(2025, 3, start),
        end_date: date(2025, 3, end),
        region: Some(region.to_string()),
        cp: None,
        school_id: None,
        school_name: None,
    }
}

fn result(region: &str, school_id: &str, formula_id: i64, amount: Decimal) -> SettlementResultUpsert {
    SettlementResultUpsert {
        formula_id,
        formula_name: format!("formula {}", formula_id),
        formula_tokens: json!([]),
        region: region.to_string(),
        cp: CP.to_string(),
        school_id: school_id.to_string(),
        school_name: format!("{} school", school_id),
        start_date: date(2025, 3, 1),
        end_date: date(2025, 3, 7),
        billing_days: 7,
        total_95_flow: 700.0,
        average_95_flow: 100.0,
        customer_fee: None,
        network_line_fee: None,
        general_fee: None,
        node_deduction_fee: None,
        final_fee: None,
        amount,
        amount_raw: 0.0,
        currency: "CNY".to_string(),
        missing_days: 0,
        missing_fields: vec!["customer_fee".to_string()],
        calculation_detail: json!({}),
    }
}

fn rate(region: &str, school_name: &str, customer_fee: Option<f64>) -> NewRateCustomer {
    NewRateCustomer {
        region: region.to_string(),
        cp: CP.to_string(),
        school_name: school_name.to_string(),
        customer_fee,
        network_line_fee: None,
        general_fee: None,
        fee_mode: FeeMode::Auto,
        extra: json!({"final_fee": 3}),
        last_sync_time: None,
        last_sync_rule_id: None,
    }
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_pg_upsert_daily_is_idempotent() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = PgStore::new(db.clone());
    let region = unique_region("daily");

    let first = store.upsert_daily(daily(&region, "s1", 1, 100)).await.unwrap();
    let second = store.upsert_daily(daily(&region, "s1", 1, 250)).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.settlement_value, 250);

    let rows = store.list_daily(&range_filter(&region, 1, 1)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].settlement_value, 250);

    cleanup(&db, &region).await;
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_pg_result_upsert_replaces_by_natural_key() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = PgStore::new(db.clone());
    let region = unique_region("results");

    store
        .upsert_results(vec![result(&region, "s1", 1, dec!(10.00))])
        .await
        .unwrap();
    store
        .upsert_results(vec![result(&region, "s1", 2, dec!(12.50))])
        .await
        .unwrap();

    let mut filter = SettlementResultFilter::for_range(date(2025, 3, 1), date(2025, 3, 7));
    filter.region = Some(region.clone());
    let (rows, total) = store.list_results(&filter).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].formula_id, 2);
    assert_eq!(rows[0].amount, dec!(12.50));
    assert_eq!(rows[0].missing_fields, json!(["customer_fee"]));

    cleanup(&db, &region).await;
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_pg_result_upsert_beyond_bind_limit() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = PgStore::new(db.clone());
    let region = unique_region("bulk");

    // 25 binds per row: 3000 rows would not fit one statement
    let records = (0..3000)
        .map(|i| result(&region, &format!("s{}", i), 1, dec!(1.00)))
        .collect();
    store.upsert_results(records).await.unwrap();

    let mut filter = SettlementResultFilter::for_range(date(2025, 3, 1), date(2025, 3, 7));
    filter.region = Some(region.clone());
    filter.limit = 1;
    let (_, total) = store.list_results(&filter).await.unwrap();
    assert_eq!(total, 3000);

    cleanup(&db, &region).await;
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_pg_aggregate_counts_recorded_days() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = PgStore::new(db.clone());
    let region = unique_region("gaps");

    for (day, value) in [(1, 100), (2, 300), (4, 200)] {
        store.upsert_daily(daily(&region, "s1", day, value)).await.unwrap();
    }
    // outside the range
    store.upsert_daily(daily(&region, "s1", 9, 5000)).await.unwrap();

    let flows = store.aggregate_flows(&range_filter(&region, 1, 5)).await.unwrap();
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].school_id, "s1");
    assert_eq!(flows[0].day_count, 3);
    assert_eq!(flows[0].total_flow, 600.0);

    cleanup(&db, &region).await;
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_pg_aggregate_keeps_schools_without_rate_row() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = PgStore::new(db.clone());
    let region = unique_region("join");

    store.upsert_daily(daily(&region, "s1", 1, 100)).await.unwrap();
    store.upsert_daily(daily(&region, "s2", 1, 400)).await.unwrap();
    store
        .insert_customer_rate(rate(&region, "s1 school", Some(12.0)))
        .await
        .unwrap();

    let flows = store.aggregate_flows(&range_filter(&region, 1, 1)).await.unwrap();
    assert_eq!(flows.len(), 2);
    // ordered by total flow, highest first
    assert_eq!(flows[0].school_id, "s2");
    assert_eq!(flows[0].customer_fee, None);
    assert_eq!(flows[0].final_fee, None);
    assert_eq!(flows[1].school_id, "s1");
    assert_eq!(flows[1].customer_fee, Some(12.0));
    assert_eq!(flows[1].final_fee, Some(3.0));

    cleanup(&db, &region).await;
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_pg_rate_patch_and_listing() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = PgStore::new(db.clone());
    let region = unique_region("rates");

    let row = store
        .insert_customer_rate(rate(&region, "Alpha", Some(5.0)))
        .await
        .unwrap();
    store
        .update_customer_rate(
            row.id,
            RateCustomerPatch {
                fee_mode: Some(FeeMode::Configed),
                general_fee: Some(2.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let filter = CustomerRateFilter {
        region: Some(region.clone()),
        ..Default::default()
    };
    let (rows, total) = store.list_customer_rates(&filter, 10, 0).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].fee_mode, "configed");
    assert_eq!(rows[0].customer_fee, Some(5.0));
    assert_eq!(rows[0].general_fee, Some(2.0));

    let missing = store
        .update_customer_rate(-1, RateCustomerPatch::default())
        .await;
    assert!(missing.is_err());

    cleanup(&db, &region).await;
}

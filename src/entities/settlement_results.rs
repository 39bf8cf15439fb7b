//! `SeaORM` Entity for settlement_results table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Cached billing result for one (region, cp, school_id, start_date, end_date)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "settlement_results")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub formula_id: i64,
    pub formula_name: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub formula_tokens: Json,
    pub region: String,
    pub cp: String,
    pub school_id: String,
    pub school_name: String,
    pub start_date: Date,
    pub end_date: Date,
    pub billing_days: i32,
    pub total_95_flow: f64,
    pub average_95_flow: f64,
    pub customer_fee: Option<f64>,
    pub network_line_fee: Option<f64>,
    pub general_fee: Option<f64>,
    pub node_deduction_fee: Option<f64>,
    pub final_fee: Option<f64>,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub amount: Decimal,
    pub amount_raw: f64,
    pub currency: String,
    pub missing_days: i32,
    #[sea_orm(column_type = "JsonBinary")]
    pub missing_fields: Json,
    #[sea_orm(column_type = "JsonBinary")]
    pub calculation_detail: Json,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

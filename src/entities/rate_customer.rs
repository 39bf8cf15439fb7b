//! `SeaORM` Entity for rate_customer table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rate_customer")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub region: String,
    pub cp: String,
    pub school_name: String,
    pub customer_fee: Option<f64>,
    pub network_line_fee: Option<f64>,
    pub general_fee: Option<f64>,
    /// "auto" or "configed"; configed fee fields are never touched by sync
    pub fee_mode: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub extra: Json,
    pub last_sync_time: Option<DateTime>,
    pub last_sync_rule_id: Option<i64>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

//! `SeaORM` Entity for rate_customer_sync_rules table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rate_customer_sync_rules")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub priority: i32,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub scope_region: Option<Json>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub scope_cp: Option<Json>,
    /// String array whitelist, or the legacy `{"extra": {...}}` object
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub fields_to_update: Option<Json>,
    pub overwrite_strategy: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub actions: Json,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

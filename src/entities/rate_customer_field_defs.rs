//! `SeaORM` Entity for rate_customer_field_defs table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rate_customer_field_defs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub field_key: String,
    pub label: String,
    pub data_type: String,
    pub enabled: bool,
    pub usable_in_rules: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub enum_options: Option<Json>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

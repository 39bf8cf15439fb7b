//! `SeaORM` Entity for school_settlement table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Daily 95th-percentile value, unique per (region, cp, school_id, settlement_date)
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "school_settlement")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub school_id: String,
    pub school_name: String,
    pub region: String,
    pub cp: String,
    /// bits/s
    pub settlement_value: i64,
    pub settlement_time: DateTime,
    pub settlement_date: Date,
    pub create_time: DateTime,
    pub update_time: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

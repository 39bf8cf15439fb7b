//! `SeaORM` Entity for settlement_config table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "settlement_config")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// "HH:MM"
    pub daily_time: String,
    /// ISO weekday, Monday = 1 .. Sunday = 7
    pub weekly_day: i32,
    pub weekly_time: String,
    pub enabled: bool,
    pub last_execute_time: Option<DateTime>,
    pub update_time: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

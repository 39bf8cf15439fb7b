//! `SeaORM` Entity for school_traffic table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One fixed-interval traffic sample. Byte counters cover the whole interval.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "school_traffic")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub create_time: DateTime,
    pub school_id: String,
    pub school_name: String,
    pub region: String,
    pub cp: String,
    pub total_recv: i64,
    pub total_send: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

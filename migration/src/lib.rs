pub use sea_orm_migration::prelude::*;

mod m20251001_000001_create_school_tables;
mod m20251001_000002_create_school_settlement;
mod m20251002_000001_create_settlement_formulas;
mod m20251002_000002_create_settlement_results;
mod m20251003_000001_create_rate_customer;
mod m20251004_000001_create_settlement_schedule;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251001_000001_create_school_tables::Migration),
            Box::new(m20251001_000002_create_school_settlement::Migration),
            Box::new(m20251002_000001_create_settlement_formulas::Migration),
            Box::new(m20251002_000002_create_settlement_results::Migration),
            Box::new(m20251003_000001_create_rate_customer::Migration),
            Box::new(m20251004_000001_create_settlement_schedule::Migration),
        ]
    }
}

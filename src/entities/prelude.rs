//! `SeaORM` Entity prelude

pub use super::rate_customer::Entity as RateCustomer;
pub use super::rate_customer_field_defs::Entity as RateCustomerFieldDefs;
pub use super::rate_customer_sync_rules::Entity as RateCustomerSyncRules;
pub use super::school::Entity as School;
pub use super::school_settlement::Entity as SchoolSettlement;
pub use super::school_traffic::Entity as SchoolTraffic;
pub use super::settlement_config::Entity as SettlementConfig;
pub use super::settlement_formulas::Entity as SettlementFormulas;
pub use super::settlement_results::Entity as SettlementResults;
pub use super::settlement_task::Entity as SettlementTask;

pub mod settlement_scheduler;

pub mod formula;
pub mod rates;
pub mod schedule;
pub mod settlement;

pub mod formulas;
pub mod health;
pub mod rates;
pub mod schedule;
pub mod settlement;

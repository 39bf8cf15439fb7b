//! Runtime configuration loaded from environment variables.

use std::env;
use std::str::FromStr;

use tracing::warn;

use crate::error::{Result, SettlementError};

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
/// Traffic collectors sample every 5 minutes
pub const DEFAULT_SAMPLE_INTERVAL_SECS: i64 = 300;
pub const DEFAULT_SETTLEMENT_TICK_SECS: u64 = 60;
pub const DEFAULT_SETTLEMENT_WORKERS: usize = 2;
pub const DEFAULT_SETTLEMENT_QUEUE_SIZE: usize = 64;
pub const DEFAULT_RATE_SYNC_PAGE_SIZE: u64 = 500;
pub const DEFAULT_SCHOOL_PAGE_SIZE: u64 = 500;
pub const DEFAULT_UNIT_BASE: u32 = 1024;

const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_BIND_ADDRESS: &str = "BIND_ADDRESS";
const ENV_SAMPLE_INTERVAL: &str = "SAMPLE_INTERVAL_SECS";
const ENV_TICK_SECS: &str = "SETTLEMENT_TICK_SECS";
const ENV_WORKERS: &str = "SETTLEMENT_WORKERS";
const ENV_QUEUE_SIZE: &str = "SETTLEMENT_QUEUE_SIZE";
const ENV_PAGE_SIZE: &str = "RATE_SYNC_PAGE_SIZE";
const ENV_SCHOOL_PAGE_SIZE: &str = "SCHOOL_PAGE_SIZE";
const ENV_UNIT_BASE: &str = "SETTLEMENT_UNIT_BASE";
const ENV_SCHEDULER_ENABLED: &str = "SETTLEMENT_SCHEDULER_ENABLED";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_address: String,
    /// Seconds covered by one traffic sample; divides byte counters into bits/s
    pub sample_interval_secs: i64,
    pub tick_secs: u64,
    pub workers: usize,
    pub queue_size: usize,
    /// School directory page size used by rate sync
    pub rate_sync_page_size: u64,
    /// School directory page size used by the daily percentile batch
    pub school_page_size: u64,
    /// Default GB/GiB base when a request does not name one
    pub unit_base: u32,
    pub scheduler_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            sample_interval_secs: DEFAULT_SAMPLE_INTERVAL_SECS,
            tick_secs: DEFAULT_SETTLEMENT_TICK_SECS,
            workers: DEFAULT_SETTLEMENT_WORKERS,
            queue_size: DEFAULT_SETTLEMENT_QUEUE_SIZE,
            rate_sync_page_size: DEFAULT_RATE_SYNC_PAGE_SIZE,
            school_page_size: DEFAULT_SCHOOL_PAGE_SIZE,
            unit_base: DEFAULT_UNIT_BASE,
            scheduler_enabled: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url = env::var(ENV_DATABASE_URL)
            .map_err(|_| SettlementError::validation("DATABASE_URL must be set"))?;

        Ok(Self {
            database_url,
            bind_address: env::var(ENV_BIND_ADDRESS)
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            sample_interval_secs: positive_or(
                env_or(ENV_SAMPLE_INTERVAL, DEFAULT_SAMPLE_INTERVAL_SECS),
                DEFAULT_SAMPLE_INTERVAL_SECS,
            ),
            tick_secs: positive_or(
                env_or(ENV_TICK_SECS, DEFAULT_SETTLEMENT_TICK_SECS),
                DEFAULT_SETTLEMENT_TICK_SECS,
            ),
            workers: positive_or(env_or(ENV_WORKERS, DEFAULT_SETTLEMENT_WORKERS), 1),
            queue_size: positive_or(
                env_or(ENV_QUEUE_SIZE, DEFAULT_SETTLEMENT_QUEUE_SIZE),
                DEFAULT_SETTLEMENT_QUEUE_SIZE,
            ),
            rate_sync_page_size: positive_or(
                env_or(ENV_PAGE_SIZE, DEFAULT_RATE_SYNC_PAGE_SIZE),
                DEFAULT_RATE_SYNC_PAGE_SIZE,
            ),
            school_page_size: positive_or(
                env_or(ENV_SCHOOL_PAGE_SIZE, DEFAULT_SCHOOL_PAGE_SIZE),
                DEFAULT_SCHOOL_PAGE_SIZE,
            ),
            unit_base: normalize_unit_base(env_or(ENV_UNIT_BASE, DEFAULT_UNIT_BASE)),
            scheduler_enabled: env::var(ENV_SCHEDULER_ENABLED)
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
        })
    }
}

/// Only 1000 (GB) and 1024 (GiB) are supported; anything else means GiB.
pub fn normalize_unit_base(base: u32) -> u32 {
    match base {
        1000 | 1024 => base,
        _ => DEFAULT_UNIT_BASE,
    }
}

fn env_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(key = key, value = %raw, default = %default, "Invalid number in environment, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn positive_or<T: PartialOrd + Default>(value: T, fallback: T) -> T {
    if value > T::default() { value } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.bind_address, "0.0.0.0:3000");
        assert_eq!(cfg.sample_interval_secs, 300);
        assert_eq!(cfg.tick_secs, 60);
        assert_eq!(cfg.rate_sync_page_size, 500);
        assert_eq!(cfg.school_page_size, 500);
        assert_eq!(cfg.unit_base, 1024);
        assert!(cfg.scheduler_enabled);
    }

    #[test]
    fn test_normalize_unit_base() {
        assert_eq!(normalize_unit_base(1000), 1000);
        assert_eq!(normalize_unit_base(1024), 1024);
        assert_eq!(normalize_unit_base(0), 1024);
        assert_eq!(normalize_unit_base(999), 1024);
    }

    #[test]
    fn test_positive_or() {
        assert_eq!(positive_or(0u64, 60), 60);
        assert_eq!(positive_or(-5i64, 300), 300);
        assert_eq!(positive_or(30u64, 60), 30);
    }
}

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::info;

use crate::error::Result;
use crate::models::schedule::{ScheduleConfig, ScheduleConfigUpdate};
use crate::store::ConfigStore;

/// Singleton schedule config; defaults apply until the first save
#[derive(Clone)]
pub struct SettlementConfigService {
    store: Arc<dyn ConfigStore>,
}

impl SettlementConfigService {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self) -> Result<ScheduleConfig> {
        Ok(self
            .store
            .settlement_config()
            .await?
            .map(ScheduleConfig::from)
            .unwrap_or_default())
    }

    pub async fn update(&self, update: ScheduleConfigUpdate) -> Result<ScheduleConfig> {
        update.validate()?;
        let current = self.get().await?;
        let config = ScheduleConfig {
            daily_time: update.daily_time,
            weekly_day: update.weekly_day,
            weekly_time: update.weekly_time,
            enabled: update.enabled,
            last_execute_time: current.last_execute_time,
        };
        let saved = ScheduleConfig::from(self.store.save_settlement_config(config).await?);
        info!(
            daily_time = %saved.daily_time,
            weekly_day = saved.weekly_day,
            weekly_time = %saved.weekly_time,
            enabled = saved.enabled,
            "Settlement schedule updated"
        );
        Ok(saved)
    }

    pub async fn mark_executed(&self, at: NaiveDateTime) -> Result<()> {
        let mut config = self.get().await?;
        config.last_execute_time = Some(at);
        self.store.save_settlement_config(config).await?;
        Ok(())
    }
}

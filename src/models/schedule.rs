//! Settlement schedule config and task models

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::entities::settlement_config;
use crate::error::{Result, SettlementError};

pub const DEFAULT_DAILY_TIME: &str = "02:00";
pub const DEFAULT_WEEKLY_DAY: u32 = 1;
pub const DEFAULT_WEEKLY_TIME: &str = "03:00";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Daily,
    Weekly,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Daily => "daily",
            TaskType::Weekly => "weekly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "success" => Some(TaskStatus::Success),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

/// Parse "HH:MM" into (hour, minute)
pub fn parse_hhmm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.trim().split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// Effective schedule; defaults apply until a row is saved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub daily_time: String,
    pub weekly_day: u32,
    pub weekly_time: String,
    pub enabled: bool,
    pub last_execute_time: Option<NaiveDateTime>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_time: DEFAULT_DAILY_TIME.to_string(),
            weekly_day: DEFAULT_WEEKLY_DAY,
            weekly_time: DEFAULT_WEEKLY_TIME.to_string(),
            enabled: true,
            last_execute_time: None,
        }
    }
}

impl From<settlement_config::Model> for ScheduleConfig {
    fn from(row: settlement_config::Model) -> Self {
        Self {
            daily_time: row.daily_time,
            weekly_day: row.weekly_day.clamp(1, 7) as u32,
            weekly_time: row.weekly_time,
            enabled: row.enabled,
            last_execute_time: row.last_execute_time,
        }
    }
}

/// PUT /api/settlement/config body
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfigUpdate {
    pub daily_time: String,
    pub weekly_day: u32,
    pub weekly_time: String,
    pub enabled: bool,
}

impl ScheduleConfigUpdate {
    pub fn validate(&self) -> Result<()> {
        if parse_hhmm(&self.daily_time).is_none() {
            return Err(SettlementError::validation("daily_time must be HH:MM"));
        }
        if parse_hhmm(&self.weekly_time).is_none() {
            return Err(SettlementError::validation("weekly_time must be HH:MM"));
        }
        if !(1..=7).contains(&self.weekly_day) {
            return Err(SettlementError::validation("weekly_day must be between 1 and 7"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSettlementTask {
    pub task_type: TaskType,
    pub task_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Partial task update; `None` leaves the column untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    pub status: TaskStatus,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub processed_count: Option<i32>,
    pub error_message: Option<String>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status,
            start_time: None,
            end_time: None,
            processed_count: None,
            error_message: None,
        }
    }
}

/// Published to subscribers when a queued task finishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub task_id: i64,
    pub task_type: TaskType,
    pub task_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: TaskStatus,
    pub processed_count: i32,
    pub error: Option<String>,
}

/// Result of asking the queue to run a (type, date) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "task_id", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Queued(i64),
    /// A non-failed task for the same key already exists
    AlreadyScheduled(i64),
}

impl DispatchOutcome {
    pub fn task_id(&self) -> i64 {
        match self {
            DispatchOutcome::Queued(id) | DispatchOutcome::AlreadyScheduled(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualDailyQuery {
    pub date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualWeeklyQuery {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskListQuery {
    pub limit: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("02:00"), Some((2, 0)));
        assert_eq!(parse_hhmm("23:59"), Some((23, 59)));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("2:00"), None);
        assert_eq!(parse_hhmm("garbage"), None);
    }

    #[test]
    fn test_default_schedule() {
        let cfg = ScheduleConfig::default();
        assert_eq!(cfg.daily_time, "02:00");
        assert_eq!(cfg.weekly_day, 1);
        assert_eq!(cfg.weekly_time, "03:00");
        assert!(cfg.enabled);
    }

    #[test]
    fn test_update_validation() {
        let mut update = ScheduleConfigUpdate {
            daily_time: "01:30".into(),
            weekly_day: 7,
            weekly_time: "04:00".into(),
            enabled: true,
        };
        assert!(update.validate().is_ok());
        update.weekly_day = 8;
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_status_strings() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Success,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
    }
}

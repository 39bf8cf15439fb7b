//! Settlement Scheduler Job
//!
//! Reads the schedule config on every tick and dispatches the daily and
//! weekly settlement tasks whose configured time matches the local wall
//! clock. The task queue drops duplicate (type, date) dispatches, so a
//! tick landing twice inside the same minute is harmless.

use std::sync::Arc;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, Timelike};
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::models::schedule::{parse_hhmm, DispatchOutcome, ScheduleConfig, TaskType};
use crate::services::settlement_config::SettlementConfigService;
use crate::services::settlement_task::TaskQueue;

/// Source of the local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// One recurring trigger; `weekday` is ISO (1 = Monday) and only set for weekly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleDefinition {
    pub task_type: TaskType,
    pub hour: u32,
    pub minute: u32,
    pub weekday: Option<u32>,
}

impl ScheduleDefinition {
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now.hour() == self.hour
            && now.minute() == self.minute
            && self
                .weekday
                .is_none_or(|day| now.weekday().number_from_monday() == day)
    }
}

pub fn definitions_from_config(config: &ScheduleConfig) -> Vec<ScheduleDefinition> {
    let mut defs = Vec::with_capacity(2);

    match parse_hhmm(&config.daily_time) {
        Some((hour, minute)) => defs.push(ScheduleDefinition {
            task_type: TaskType::Daily,
            hour,
            minute,
            weekday: None,
        }),
        None => warn!(daily_time = %config.daily_time, "Invalid daily_time, daily schedule skipped"),
    }

    match parse_hhmm(&config.weekly_time) {
        Some((hour, minute)) => defs.push(ScheduleDefinition {
            task_type: TaskType::Weekly,
            hour,
            minute,
            weekday: Some(config.weekly_day.clamp(1, 7)),
        }),
        None => warn!(weekly_time = %config.weekly_time, "Invalid weekly_time, weekly schedule skipped"),
    }

    defs
}

/// Monday through Sunday of the week before `today`
pub fn weekly_target(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let this_monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    let start = this_monday - Duration::days(7);
    (start, start + Duration::days(6))
}

/// (type, start, end) for every definition due at `now`
pub fn due_targets(
    defs: &[ScheduleDefinition],
    now: NaiveDateTime,
) -> Vec<(TaskType, NaiveDate, NaiveDate)> {
    let today = now.date();
    defs.iter()
        .filter(|def| def.is_due(now))
        .map(|def| match def.task_type {
            TaskType::Daily => {
                let yesterday = today - Duration::days(1);
                (TaskType::Daily, yesterday, yesterday)
            }
            TaskType::Weekly => {
                let (start, end) = weekly_target(today);
                (TaskType::Weekly, start, end)
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct SettlementScheduler {
    config: SettlementConfigService,
    queue: TaskQueue,
    clock: Arc<dyn Clock>,
}

impl SettlementScheduler {
    pub fn new(config: SettlementConfigService, queue: TaskQueue, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            queue,
            clock,
        }
    }

    /// Dispatch whatever is due now; returns the ids of newly queued tasks
    pub async fn tick(&self) -> Result<Vec<i64>> {
        let config = self.config.get().await?;
        if !config.enabled {
            debug!("Settlement schedule disabled");
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let defs = definitions_from_config(&config);
        let mut queued = Vec::new();
        for (task_type, start, end) in due_targets(&defs, now) {
            match self.queue.dispatch(task_type, start, end).await {
                Ok(DispatchOutcome::Queued(id)) => queued.push(id),
                Ok(DispatchOutcome::AlreadyScheduled(id)) => {
                    debug!(task_id = id, task_type = task_type.as_str(), "Scheduled task already exists")
                }
                Err(e) => {
                    error!(task_type = task_type.as_str(), %start, %end, error = %e, "Scheduled dispatch failed")
                }
            }
        }

        if !queued.is_empty() {
            self.config.mark_executed(now).await?;
        }
        Ok(queued)
    }
}

/// Start the settlement scheduler
///
/// Ticks every `tick_secs` seconds until a shutdown signal arrives. A failed
/// tick is logged and the next tick retries.
pub async fn start_settlement_scheduler(scheduler: SettlementScheduler, tick_secs: u64) {
    tokio::spawn(async move {
        info!(tick_secs, "Settlement scheduler started");
        let mut interval = interval(TokioDuration::from_secs(tick_secs.max(1)));

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping settlement scheduler");
                    break;
                }
                _ = interval.tick() => {
                    match scheduler.tick().await {
                        Ok(queued) if !queued.is_empty() => {
                            info!(tasks = ?queued, "Scheduled settlement tasks queued");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Settlement scheduler tick failed"),
                    }
                }
            }
        }

        info!("Settlement scheduler stopped");
    });
}

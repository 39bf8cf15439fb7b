mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;
use settlement_backend::{
    entities::settlement_task,
    error::{Result, SettlementError},
    jobs::settlement_scheduler::{Clock, SettlementScheduler},
    models::{
        formula::FormulaInput,
        schedule::{
            DispatchOutcome, NewSettlementTask, ScheduleConfigUpdate, TaskOutcome, TaskStatus,
            TaskType, TaskUpdate,
        },
    },
    services::settlement_task::{SettlementPipeline, TaskQueue},
    store::{MemoryStore, TaskStore},
};
use tokio::sync::broadcast;

use crate::common::{at, date, setup_test_app, TestApp, CP, REGION};

struct FixedClock(NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

fn scheduler(app: &TestApp, now: NaiveDateTime) -> SettlementScheduler {
    SettlementScheduler::new(
        app.state.schedule.clone(),
        app.state.tasks.clone(),
        Arc::new(FixedClock(now)),
    )
}

async fn next_outcome(rx: &mut broadcast::Receiver<TaskOutcome>) -> TaskOutcome {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("task did not finish in time")
        .unwrap()
}

#[tokio::test]
async fn test_duplicate_dispatch_creates_one_task() {
    let app = setup_test_app();
    let day = date(2025, 3, 9);
    app.seed_day("s1", "Alpha", day, &[10, 20, 30]);
    let mut rx = app.state.tasks.subscribe();

    let first = app.state.tasks.run_daily(day).await.unwrap();
    let second = app.state.tasks.run_daily(day).await.unwrap();
    assert!(matches!(first, DispatchOutcome::Queued(_)));
    assert_eq!(second, DispatchOutcome::AlreadyScheduled(first.task_id()));

    let outcome = next_outcome(&mut rx).await;
    assert_eq!(outcome.task_id, first.task_id());
    assert_eq!(outcome.status, TaskStatus::Success);
    assert_eq!(outcome.processed_count, 1);
    assert!(outcome.error.is_none());

    let tasks = app.store.task_rows();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, "success");
    assert!(tasks[0].start_time.is_some());
    assert!(tasks[0].end_time.is_some());

    // A finished task still blocks the key
    let third = app.state.tasks.run_daily(day).await.unwrap();
    assert_eq!(third, DispatchOutcome::AlreadyScheduled(first.task_id()));
    assert_eq!(app.store.daily_rows().len(), 1);
}

#[tokio::test]
async fn test_weekly_run_covers_every_day() {
    let app = setup_test_app();
    app.seed_day("s1", "Alpha", date(2025, 3, 3), &[10, 20]);
    app.seed_day("s1", "Alpha", date(2025, 3, 5), &[30]);
    let mut rx = app.state.tasks.subscribe();

    app.state
        .tasks
        .run_weekly(date(2025, 3, 3), date(2025, 3, 9))
        .await
        .unwrap();

    let outcome = next_outcome(&mut rx).await;
    assert_eq!(outcome.task_type, TaskType::Weekly);
    assert_eq!(outcome.status, TaskStatus::Success);
    assert_eq!(outcome.processed_count, 2);
}

#[tokio::test]
async fn test_weekly_run_aggregates_results() {
    let app = setup_test_app();
    app.state
        .formulas
        .create(FormulaInput {
            name: "flat".to_string(),
            description: None,
            tokens: json!([{"type": "number", "value": "7"}]),
            enabled: true,
            updated_by: None,
        })
        .await
        .unwrap();
    app.seed_day("s1", "Alpha", date(2025, 3, 3), &[10, 20]);
    app.seed_day("s1", "Alpha", date(2025, 3, 5), &[30]);
    let mut rx = app.state.tasks.subscribe();

    app.state
        .tasks
        .run_weekly(date(2025, 3, 3), date(2025, 3, 9))
        .await
        .unwrap();
    let outcome = next_outcome(&mut rx).await;
    assert_eq!(outcome.status, TaskStatus::Success);

    let results = app.store.result_rows();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].school_id, "s1");
    assert_eq!(results[0].region, REGION);
    assert_eq!(results[0].cp, CP);
    assert_eq!(results[0].start_date, date(2025, 3, 3));
    assert_eq!(results[0].end_date, date(2025, 3, 9));
    assert_eq!(results[0].billing_days, 2);
    assert_eq!(results[0].missing_days, 5);
}

#[tokio::test]
async fn test_weekly_run_without_formula_keeps_daily_rows() {
    let app = setup_test_app();
    app.seed_day("s1", "Alpha", date(2025, 3, 3), &[10]);
    let mut rx = app.state.tasks.subscribe();

    app.state
        .tasks
        .run_weekly(date(2025, 3, 3), date(2025, 3, 9))
        .await
        .unwrap();
    let outcome = next_outcome(&mut rx).await;
    assert_eq!(outcome.status, TaskStatus::Success);
    assert_eq!(app.store.daily_rows().len(), 1);
    assert!(app.store.result_rows().is_empty());
}

#[tokio::test]
async fn test_manual_weekly_range_validation() {
    let app = setup_test_app();
    assert!(app
        .state
        .tasks
        .run_weekly(date(2025, 3, 9), date(2025, 3, 3))
        .await
        .is_err());
    assert!(app
        .state
        .tasks
        .run_weekly(date(2025, 1, 1), date(2025, 3, 1))
        .await
        .is_err());
    assert!(app.store.task_rows().is_empty());
}

#[tokio::test]
async fn test_tick_dispatches_previous_week_once() {
    let app = setup_test_app();
    // Monday 03:00 matches the default weekly schedule
    let now = at(date(2025, 3, 10), 180);
    let scheduler = scheduler(&app, now);

    let queued = scheduler.tick().await.unwrap();
    assert_eq!(queued.len(), 1);
    let again = scheduler.tick().await.unwrap();
    assert!(again.is_empty());

    let tasks = app.store.task_rows();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_type, "weekly");
    assert_eq!(tasks[0].task_date, date(2025, 3, 3));
    assert_eq!(tasks[0].end_date, date(2025, 3, 9));

    let config = app.state.schedule.get().await.unwrap();
    assert_eq!(config.last_execute_time, Some(now));
}

#[tokio::test]
async fn test_tick_daily_targets_yesterday() {
    let app = setup_test_app();
    let queued = scheduler(&app, at(date(2025, 3, 12), 120))
        .tick()
        .await
        .unwrap();
    assert_eq!(queued.len(), 1);

    let tasks = app.store.task_rows();
    assert_eq!(tasks[0].task_type, "daily");
    assert_eq!(tasks[0].task_date, date(2025, 3, 11));
}

#[tokio::test]
async fn test_tick_respects_saved_config() {
    let app = setup_test_app();
    app.state
        .schedule
        .update(ScheduleConfigUpdate {
            daily_time: "01:30".into(),
            weekly_day: 3,
            weekly_time: "04:00".into(),
            enabled: true,
        })
        .await
        .unwrap();

    // Default times no longer fire
    assert!(scheduler(&app, at(date(2025, 3, 12), 120)).tick().await.unwrap().is_empty());
    // Wednesday 04:00 fires the weekly run for the previous week
    let queued = scheduler(&app, at(date(2025, 3, 12), 240)).tick().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(app.store.task_rows()[0].task_date, date(2025, 3, 3));

    app.state
        .schedule
        .update(ScheduleConfigUpdate {
            daily_time: "01:30".into(),
            weekly_day: 3,
            weekly_time: "04:00".into(),
            enabled: false,
        })
        .await
        .unwrap();
    assert!(scheduler(&app, at(date(2025, 3, 13), 90)).tick().await.unwrap().is_empty());
}

/// Task store that refuses to create daily tasks
struct NoDailyTasks(Arc<MemoryStore>);

#[async_trait]
impl TaskStore for NoDailyTasks {
    async fn find_task(
        &self,
        task_type: TaskType,
        task_date: NaiveDate,
    ) -> Result<Option<settlement_task::Model>> {
        self.0.find_task(task_type, task_date).await
    }

    async fn create_task(&self, task: NewSettlementTask) -> Result<settlement_task::Model> {
        if task.task_type == TaskType::Daily {
            return Err(SettlementError::Persistence("task table locked".to_string()));
        }
        self.0.create_task(task).await
    }

    async fn update_task(&self, id: i64, update: TaskUpdate) -> Result<()> {
        self.0.update_task(id, update).await
    }

    async fn list_tasks(&self, limit: u64) -> Result<Vec<settlement_task::Model>> {
        self.0.list_tasks(limit).await
    }
}

#[tokio::test]
async fn test_failed_dispatch_does_not_block_other_schedules() {
    let app = setup_test_app();
    app.state
        .schedule
        .update(ScheduleConfigUpdate {
            daily_time: "03:00".into(),
            weekly_day: 1,
            weekly_time: "03:00".into(),
            enabled: true,
        })
        .await
        .unwrap();
    let queue = TaskQueue::start(
        Arc::new(NoDailyTasks(app.store.clone())),
        SettlementPipeline::new(app.state.percentile.clone(), app.state.results.clone()),
        1,
        4,
    );
    // Monday 03:00: both schedules are due, the daily one fails to dispatch
    let now = at(date(2025, 3, 10), 180);
    let scheduler = SettlementScheduler::new(app.state.schedule.clone(), queue, Arc::new(FixedClock(now)));

    let queued = scheduler.tick().await.unwrap();
    assert_eq!(queued.len(), 1);

    let tasks = app.store.task_rows();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_type, "weekly");
    let config = app.state.schedule.get().await.unwrap();
    assert_eq!(config.last_execute_time, Some(now));
}

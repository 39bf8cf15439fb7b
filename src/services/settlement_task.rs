//! Settlement task queue.
//!
//! Triggers become task rows keyed by (type, target date) and are handed to
//! a pool of workers over a bounded channel. A key that already has a
//! pending, running or successful task is not dispatched again. Finished
//! tasks are broadcast to subscribers.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{error, info, warn};

use crate::entities::settlement_task;
use crate::error::{Result, SettlementError};
use crate::models::schedule::{
    DispatchOutcome, NewSettlementTask, TaskOutcome, TaskStatus, TaskType, TaskUpdate,
};
use crate::models::settlement::SettlementResultFilter;
use crate::services::percentile::PercentileCalculator;
use crate::services::settlement_result::SettlementResultService;
use crate::store::TaskStore;

const OUTCOME_CHANNEL_SIZE: usize = 64;
/// Longest range a manual weekly trigger may cover
const MAX_MANUAL_RANGE_DAYS: i64 = 31;

/// Daily percentile run over a date range, followed by result aggregation
#[derive(Clone)]
pub struct SettlementPipeline {
    percentile: PercentileCalculator,
    results: SettlementResultService,
}

impl SettlementPipeline {
    pub fn new(percentile: PercentileCalculator, results: SettlementResultService) -> Self {
        Self { percentile, results }
    }

    /// Daily rows written across `[start, end]`.
    ///
    /// Aggregation needs a formula. Without one the percentile rows are kept
    /// and the run still succeeds.
    pub async fn run(&self, start: NaiveDate, end: NaiveDate) -> Result<usize> {
        let mut written = 0;
        let mut date = start;
        while date <= end {
            written += self.percentile.calculate_all_schools(date).await?;
            date += Duration::days(1);
        }

        match self
            .results
            .calculate_range(&SettlementResultFilter::for_range(start, end))
            .await
        {
            Ok(computed) => info!(%start, %end, computed, "Range aggregated"),
            Err(SettlementError::NotFound(reason)) => {
                warn!(%start, %end, %reason, "Aggregation skipped")
            }
            Err(e) => return Err(e),
        }
        Ok(written)
    }
}

#[derive(Debug, Clone)]
struct QueuedTask {
    id: i64,
    task_type: TaskType,
    task_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Clone)]
pub struct TaskQueue {
    tasks: Arc<dyn TaskStore>,
    sender: mpsc::Sender<QueuedTask>,
    outcomes: broadcast::Sender<TaskOutcome>,
    dispatch_lock: Arc<Mutex<()>>,
}

impl TaskQueue {
    /// Spawn `workers` workers and return the handle used to dispatch work
    pub fn start(
        tasks: Arc<dyn TaskStore>,
        pipeline: SettlementPipeline,
        workers: usize,
        queue_size: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_SIZE);

        for worker_id in 0..workers.max(1) {
            tokio::spawn(worker_loop(
                worker_id,
                receiver.clone(),
                tasks.clone(),
                pipeline.clone(),
                outcomes.clone(),
            ));
        }
        info!(workers = workers.max(1), queue_size, "Settlement task queue started");

        Self {
            tasks,
            sender,
            outcomes,
            dispatch_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskOutcome> {
        self.outcomes.subscribe()
    }

    pub async fn dispatch(
        &self,
        task_type: TaskType,
        task_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<DispatchOutcome> {
        let _guard = self.dispatch_lock.lock().await;

        if let Some(existing) = self.tasks.find_task(task_type, task_date).await? {
            if existing.status != TaskStatus::Failed.as_str() {
                info!(
                    task_id = existing.id,
                    task_type = task_type.as_str(),
                    %task_date,
                    status = %existing.status,
                    "Task already scheduled"
                );
                return Ok(DispatchOutcome::AlreadyScheduled(existing.id));
            }
        }

        let task = self
            .tasks
            .create_task(NewSettlementTask {
                task_type,
                task_date,
                end_date,
            })
            .await?;

        let queued = QueuedTask {
            id: task.id,
            task_type,
            task_date,
            end_date,
        };
        if self.sender.send(queued).await.is_err() {
            let mut update = TaskUpdate::status(TaskStatus::Failed);
            update.error_message = Some("settlement queue is closed".to_string());
            self.tasks.update_task(task.id, update).await?;
            return Err(SettlementError::Persistence(
                "settlement queue is closed".to_string(),
            ));
        }

        info!(task_id = task.id, task_type = task_type.as_str(), %task_date, %end_date, "Task queued");
        Ok(DispatchOutcome::Queued(task.id))
    }

    pub async fn run_daily(&self, date: NaiveDate) -> Result<DispatchOutcome> {
        self.dispatch(TaskType::Daily, date, date).await
    }

    pub async fn run_weekly(&self, start: NaiveDate, end: NaiveDate) -> Result<DispatchOutcome> {
        if end < start {
            return Err(SettlementError::validation(
                "end_date must not be before start_date",
            ));
        }
        if (end - start).num_days() >= MAX_MANUAL_RANGE_DAYS {
            return Err(SettlementError::validation(format!(
                "range must cover at most {} days",
                MAX_MANUAL_RANGE_DAYS
            )));
        }
        self.dispatch(TaskType::Weekly, start, end).await
    }

    pub async fn list_tasks(&self, limit: u64) -> Result<Vec<settlement_task::Model>> {
        self.tasks.list_tasks(limit).await
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedTask>>>,
    tasks: Arc<dyn TaskStore>,
    pipeline: SettlementPipeline,
    outcomes: broadcast::Sender<TaskOutcome>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(job) = next else {
            info!(worker_id, "Settlement worker stopped");
            break;
        };

        let outcome = process(worker_id, &job, tasks.as_ref(), &pipeline).await;
        // No subscribers is fine
        let _ = outcomes.send(outcome);
    }
}

async fn process(
    worker_id: usize,
    job: &QueuedTask,
    tasks: &dyn TaskStore,
    pipeline: &SettlementPipeline,
) -> TaskOutcome {
    let mut running = TaskUpdate::status(TaskStatus::Running);
    running.start_time = Some(Utc::now().naive_utc());
    if let Err(e) = tasks.update_task(job.id, running).await {
        warn!(task_id = job.id, error = %e, "Failed to mark task running");
    }

    info!(worker_id, task_id = job.id, task_type = job.task_type.as_str(), start = %job.task_date, end = %job.end_date, "Task started");
    let result = pipeline.run(job.task_date, job.end_date).await;

    let mut finished = match &result {
        Ok(count) => {
            let mut update = TaskUpdate::status(TaskStatus::Success);
            update.processed_count = Some(*count as i32);
            update
        }
        Err(e) => {
            let mut update = TaskUpdate::status(TaskStatus::Failed);
            update.error_message = Some(e.to_string());
            update
        }
    };
    finished.end_time = Some(Utc::now().naive_utc());
    let status = finished.status;
    if let Err(e) = tasks.update_task(job.id, finished).await {
        error!(task_id = job.id, error = %e, "Failed to record task result");
    }

    match &result {
        Ok(count) => info!(task_id = job.id, processed = count, "Task succeeded"),
        Err(e) => error!(task_id = job.id, error = %e, "Task failed"),
    }

    TaskOutcome {
        task_id: job.id,
        task_type: job.task_type,
        task_date: job.task_date,
        end_date: job.end_date,
        status,
        processed_count: result.as_ref().map(|c| *c as i32).unwrap_or(0),
        error: result.err().map(|e| e.to_string()),
    }
}

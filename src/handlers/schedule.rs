use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    entities::settlement_task,
    error::SettlementError,
    models::{
        schedule::{
            DispatchOutcome, ManualDailyQuery, ManualWeeklyQuery, ScheduleConfig,
            ScheduleConfigUpdate, TaskListQuery,
        },
        settlement::parse_date,
    },
    AppState,
};

const DEFAULT_TASK_LIMIT: u64 = 50;
const MAX_TASK_LIMIT: u64 = 500;

/// Handler for GET /api/settlement/config
pub async fn get_config(
    State(state): State<AppState>,
) -> Result<Json<ScheduleConfig>, SettlementError> {
    Ok(Json(state.schedule.get().await?))
}

/// Handler for PUT /api/settlement/config
pub async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<ScheduleConfigUpdate>,
) -> Result<Json<ScheduleConfig>, SettlementError> {
    Ok(Json(state.schedule.update(update).await?))
}

/// Handler for GET /api/settlement/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<settlement_task::Model>>, SettlementError> {
    let limit = query
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_TASK_LIMIT)
        .min(MAX_TASK_LIMIT);
    Ok(Json(state.tasks.list_tasks(limit).await?))
}

/// Handler for POST /api/settlement/tasks/daily?date=YYYY-MM-DD
pub async fn run_daily(
    State(state): State<AppState>,
    Query(query): Query<ManualDailyQuery>,
) -> Result<(StatusCode, Json<DispatchOutcome>), SettlementError> {
    let date = parse_date("date", &query.date)?;
    tracing::info!(%date, "Manual daily settlement requested");
    let outcome = state.tasks.run_daily(date).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

/// Handler for POST /api/settlement/tasks/weekly?start_date=…&end_date=…
pub async fn run_weekly(
    State(state): State<AppState>,
    Query(query): Query<ManualWeeklyQuery>,
) -> Result<(StatusCode, Json<DispatchOutcome>), SettlementError> {
    let start = parse_date("start_date", &query.start_date)?;
    let end = parse_date("end_date", &query.end_date)?;
    tracing::info!(%start, %end, "Manual weekly settlement requested");
    let outcome = state.tasks.run_weekly(start, end).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

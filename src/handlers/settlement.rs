use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    entities::school_settlement,
    error::SettlementError,
    models::settlement::{
        DailyCalculateQuery, DailyListQuery, DailySettlementResponse, SettlementResultQuery,
        SettlementResultsResponse,
    },
    AppState,
};

/// Handler for POST /api/settlement/daily/calculate
/// Recomputes one school's 95th-percentile value for a day and stores it
pub async fn calculate_daily(
    State(state): State<AppState>,
    Query(query): Query<DailyCalculateQuery>,
) -> Result<Json<DailySettlementResponse>, SettlementError> {
    let (date, school_id) = query.validate()?;
    tracing::info!(%date, %school_id, "Calculating daily settlement");

    let items = state
        .percentile
        .calculate_daily(date, &school_id, None, None)
        .await?;

    Ok(Json(DailySettlementResponse {
        date,
        school_id,
        items,
    }))
}

/// Handler for GET /api/settlement/daily
pub async fn list_daily(
    State(state): State<AppState>,
    Query(query): Query<DailyListQuery>,
) -> Result<Json<Vec<school_settlement::Model>>, SettlementError> {
    let filter = query.into_filter()?;
    let rows = state.stores.daily.list_daily(&filter).await?;
    tracing::debug!(rows = rows.len(), "Listed daily settlement values");
    Ok(Json(rows))
}

/// Handler for GET /api/settlement/results
/// Recomputes every matching school for the range, then returns one page
pub async fn get_results(
    State(state): State<AppState>,
    Query(query): Query<SettlementResultQuery>,
) -> Result<Json<SettlementResultsResponse>, SettlementError> {
    tracing::info!("Calculating settlement results with query: {:?}", query);
    Ok(Json(state.results.calculate_results(query).await?))
}

/// Handler for GET /api/settlement/results/cached
pub async fn get_cached_results(
    State(state): State<AppState>,
    Query(query): Query<SettlementResultQuery>,
) -> Result<Json<SettlementResultsResponse>, SettlementError> {
    Ok(Json(state.results.list_results(query).await?))
}

/// Handler for DELETE /api/settlement/results/{id}
pub async fn delete_result(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, SettlementError> {
    state.results.delete_result(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    entities::settlement_formulas, error::SettlementError, models::formula::FormulaInput,
    AppState,
};

pub async fn list_formulas(
    State(state): State<AppState>,
) -> Result<Json<Vec<settlement_formulas::Model>>, SettlementError> {
    Ok(Json(state.formulas.list().await?))
}

pub async fn get_formula(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<settlement_formulas::Model>, SettlementError> {
    Ok(Json(state.formulas.get(id).await?))
}

/// Tokens are validated (decodable and balanced) before anything is stored
pub async fn create_formula(
    State(state): State<AppState>,
    Json(input): Json<FormulaInput>,
) -> Result<(StatusCode, Json<settlement_formulas::Model>), SettlementError> {
    let formula = state.formulas.create(input).await?;
    Ok((StatusCode::CREATED, Json(formula)))
}

pub async fn update_formula(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<FormulaInput>,
) -> Result<Json<settlement_formulas::Model>, SettlementError> {
    Ok(Json(state.formulas.update(id, input).await?))
}

pub async fn delete_formula(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, SettlementError> {
    state.formulas.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

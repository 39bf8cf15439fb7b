use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    entities::{rate_customer, rate_customer_field_defs, rate_customer_sync_rules},
    error::SettlementError,
    models::rates::{
        CustomerRatePage, CustomerRateQuery, CustomerRateUpsert, FieldDefInput, RateSyncResponse,
        SetEnabledRequest, SyncRuleInput, SyncRuleUpdate, UpdatePriorityRequest,
    },
    AppState,
};

/// Handler for GET /api/rates/customer
pub async fn list_customer_rates(
    State(state): State<AppState>,
    Query(query): Query<CustomerRateQuery>,
) -> Result<Json<CustomerRatePage>, SettlementError> {
    Ok(Json(state.customer_rates.list(query).await?))
}

/// Handler for PUT /api/rates/customer
pub async fn upsert_customer_rate(
    State(state): State<AppState>,
    Json(input): Json<CustomerRateUpsert>,
) -> Result<Json<rate_customer::Model>, SettlementError> {
    Ok(Json(state.customer_rates.upsert(input).await?))
}

/// Handler for POST /api/rates/sync/execute
///
/// Rows written before a failure stay written; the count is logged and the
/// underlying error is returned.
pub async fn execute_sync(
    State(state): State<AppState>,
) -> Result<Json<RateSyncResponse>, SettlementError> {
    match state.rate_sync.execute_sync().await {
        Ok(affected) => Ok(Json(RateSyncResponse { affected })),
        Err(aborted) => {
            tracing::error!(affected = aborted.affected, error = %aborted.source, "Rate sync aborted");
            Err(aborted.source)
        }
    }
}

pub async fn list_rules(
    State(state): State<AppState>,
) -> Result<Json<Vec<rate_customer_sync_rules::Model>>, SettlementError> {
    Ok(Json(state.sync_rules.list().await?))
}

pub async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<rate_customer_sync_rules::Model>, SettlementError> {
    Ok(Json(state.sync_rules.get(id).await?))
}

pub async fn create_rule(
    State(state): State<AppState>,
    Json(input): Json<SyncRuleInput>,
) -> Result<(StatusCode, Json<rate_customer_sync_rules::Model>), SettlementError> {
    let rule = state.sync_rules.create(input).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<SyncRuleUpdate>,
) -> Result<Json<rate_customer_sync_rules::Model>, SettlementError> {
    Ok(Json(state.sync_rules.update(id, update).await?))
}

pub async fn set_rule_enabled(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SetEnabledRequest>,
) -> Result<Json<rate_customer_sync_rules::Model>, SettlementError> {
    Ok(Json(state.sync_rules.set_enabled(id, body.enabled).await?))
}

pub async fn update_rule_priority(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePriorityRequest>,
) -> Result<Json<rate_customer_sync_rules::Model>, SettlementError> {
    Ok(Json(
        state.sync_rules.update_priority(id, body.priority).await?,
    ))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, SettlementError> {
    state.sync_rules.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_fields(
    State(state): State<AppState>,
) -> Result<Json<Vec<rate_customer_field_defs::Model>>, SettlementError> {
    Ok(Json(state.customer_fields.list().await?))
}

pub async fn create_field(
    State(state): State<AppState>,
    Json(input): Json<FieldDefInput>,
) -> Result<(StatusCode, Json<rate_customer_field_defs::Model>), SettlementError> {
    let def = state.customer_fields.create(input).await?;
    Ok((StatusCode::CREATED, Json(def)))
}

/// Handler for GET /api/schools/regions
pub async fn list_regions(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, SettlementError> {
    Ok(Json(state.stores.schools.regions().await?))
}

/// Handler for GET /api/schools/cps
pub async fn list_cps(State(state): State<AppState>) -> Result<Json<Vec<String>>, SettlementError> {
    Ok(Json(state.stores.schools.cps().await?))
}

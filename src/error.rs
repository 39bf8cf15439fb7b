//! Settlement error type and result alias.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SettlementError>;

#[derive(Error, Debug)]
pub enum SettlementError {
    /// Bad input: missing dates, inverted ranges, malformed rules
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Formula could not be decoded or evaluated
    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SettlementError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SettlementError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        SettlementError::NotFound(msg.into())
    }

    pub fn computation(msg: impl Into<String>) -> Self {
        SettlementError::Computation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SettlementError::Validation(_) => StatusCode::BAD_REQUEST,
            SettlementError::NotFound(_) => StatusCode::NOT_FOUND,
            SettlementError::Computation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SettlementError::Persistence(_) | SettlementError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::Validation(_) => "VALIDATION_ERROR",
            SettlementError::NotFound(_) => "NOT_FOUND",
            SettlementError::Computation(_) => "COMPUTATION_ERROR",
            SettlementError::Persistence(_) => "DATABASE_ERROR",
            SettlementError::Json(_) => "JSON_ERROR",
        }
    }
}

impl From<DbErr> for SettlementError {
    fn from(err: DbErr) -> Self {
        SettlementError::Persistence(err.to_string())
    }
}

/// JSON body returned for every failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for SettlementError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        } else {
            tracing::warn!(error = %self, code = self.code(), "Request rejected");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: Some(self.code().to_string()),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            SettlementError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SettlementError::not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SettlementError::computation("x").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            SettlementError::Persistence("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_db_error_becomes_persistence() {
        let err: SettlementError = DbErr::Custom("boom".to_string()).into();
        assert!(matches!(err, SettlementError::Persistence(ref m) if m.contains("boom")));
        assert_eq!(err.code(), "DATABASE_ERROR");
    }
}

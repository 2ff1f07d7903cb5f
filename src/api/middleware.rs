use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::services::deadline::Stage;

/// Header carrying the tenant identity, set by the upstream auth layer
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unsupported database type: {0}")]
    UnsupportedEngine(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Schema introspection failed: {0}")]
    IntrospectionFailed(String),

    #[error("LLM service error: {0}")]
    GenerationService(String),

    #[error("The model returned no SQL")]
    EmptyGeneration,

    #[error("Query execution failed: {cause}")]
    Execution { sql: String, cause: String },

    #[error("{stage} timed out after {}s", .limit.as_secs_f64())]
    Timeout { stage: Stage, limit: Duration },

    /// Raw driver failure, message kept exactly as the engine reported it
    #[error("{0}")]
    Database(String),

    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::UnsupportedEngine(_) => "UNSUPPORTED_ENGINE",
            AppError::NotConnected(_) => "NOT_CONNECTED",
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::IntrospectionFailed(_) => "INTROSPECTION_FAILED",
            AppError::GenerationService(_) => "LLM_SERVICE_ERROR",
            AppError::EmptyGeneration => "EMPTY_GENERATION",
            AppError::Execution { .. } => "EXECUTION_ERROR",
            AppError::Timeout { .. } => "TIMEOUT",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::InvalidSql(_) => "INVALID_SQL",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::UnsupportedEngine(_)
            | AppError::Connection(_)
            | AppError::InvalidSql(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotConnected(_) => StatusCode::CONFLICT,
            AppError::IntrospectionFailed(_) | AppError::GenerationService(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::EmptyGeneration | AppError::Execution { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            sql: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = ErrorDetail::new(self.code(), self.to_string());

        let detail = match self {
            AppError::Execution { sql, cause } => {
                // The engine's own diagnostic is the message; the failing statement rides along
                ErrorDetail::new("EXECUTION_ERROR", cause).with_sql(sql)
            }
            AppError::Timeout { stage, .. } => detail.with_details(format!("stage: {}", stage)),
            AppError::NotConnected(_) => {
                detail.with_details("Connect to a database before sending queries.")
            }
            AppError::EmptyGeneration => {
                detail.with_details("Try rephrasing the question with table or column names.")
            }
            _ => detail,
        };

        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

/// Convert anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Tenant identity of the caller, read from the `x-tenant-id` header
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for TenantId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::Validation(format!("Missing or empty {} header", TENANT_HEADER))
            })?;

        Ok(TenantId(tenant.to_string()))
    }
}

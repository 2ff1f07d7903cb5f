use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::handlers::connection::AppState;
use crate::api::middleware::{AppError, TenantId};
use crate::models::SchemaSnapshot;
use crate::services::format_schema;

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub schema: SchemaSnapshot,
    /// Text form handed to the model
    pub formatted: String,
}

/// Schema captured when the caller connected
pub async fn get_schema(
    State(state): State<AppState>,
    tenant: TenantId,
) -> Result<Json<SchemaResponse>, AppError> {
    let (engine, schema) = state.service.schema(tenant.as_str())?;
    let formatted = format_schema(&schema, engine);
    Ok(Json(SchemaResponse {
        schema: (*schema).clone(),
        formatted,
    }))
}

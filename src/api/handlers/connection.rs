use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::middleware::{AppError, TenantId};
use crate::models::{ConnectRequest, ConnectResponse, ConnectionInfo};
use crate::services::DbService;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DbService>,
}

/// Connect the caller to a database, replacing any previous connection
pub async fn connect(
    State(state): State<AppState>,
    tenant: TenantId,
    Json(payload): Json<ConnectRequest>,
) -> Result<(StatusCode, Json<ConnectResponse>), AppError> {
    tracing::info!(
        "Connect request from tenant {} ({} database {})",
        tenant.as_str(),
        payload.engine,
        payload.database
    );

    let response = state.service.connect(tenant.as_str(), payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Current connection of the caller
pub async fn get_connection(
    State(state): State<AppState>,
    tenant: TenantId,
) -> Result<Json<ConnectionInfo>, AppError> {
    state.service.connection_info(tenant.as_str()).map(Json)
}

/// Close the caller's connection. Disconnecting twice is not an error.
pub async fn disconnect(State(state): State<AppState>, tenant: TenantId) -> StatusCode {
    state.service.disconnect(tenant.as_str()).await;
    StatusCode::NO_CONTENT
}

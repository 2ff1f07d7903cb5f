use axum::{extract::State, Json};

use crate::api::handlers::connection::AppState;
use crate::api::middleware::{AppError, TenantId};
use crate::models::{QueryAnswer, QueryRequest};

/// Translate a natural language question and run it on the caller's connection
pub async fn execute_natural_language_query(
    State(state): State<AppState>,
    tenant: TenantId,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryAnswer>, AppError> {
    tracing::info!("Natural language query from tenant {}", tenant.as_str());

    let answer = state.service.query(tenant.as_str(), payload).await?;
    Ok(Json(answer))
}

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::handlers::connection::AppState;
use crate::api::handlers::{connection, metadata, query};
use crate::config::Config;
use crate::services::database::EngineAdapterFactory;
use crate::services::{DbService, LlmService, ServiceOptions};

/// Wire the real drivers and the model gateway client
pub fn build_state(config: &Config) -> AppState {
    let service = DbService::new(
        Arc::new(EngineAdapterFactory),
        Arc::new(LlmService::new(&config.llm)),
        ServiceOptions::from_config(config),
    );
    AppState {
        service: Arc::new(service),
    }
}

/// Create router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/connect", post(connection::connect))
        .route(
            "/api/connection",
            get(connection::get_connection).delete(connection::disconnect),
        )
        .route("/api/query", post(query::execute_natural_language_query))
        .route("/api/schema", get(metadata::get_schema))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::TENANT_HEADER;
    use crate::services::testing::{MockFactory, MockScript, ScriptedGenerator};
    use crate::services::StageTimeouts;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(responses: &[&str]) -> Router {
        let service = DbService::new(
            Arc::new(MockFactory::new(MockScript::shop())),
            Arc::new(ScriptedGenerator::new(responses.iter().copied())),
            ServiceOptions {
                timeouts: StageTimeouts::uniform(Duration::from_secs(5)),
                read_only: true,
                summarize_on_connect: false,
            },
        );
        create_router(AppState {
            service: Arc::new(service),
        })
    }

    fn request(method: &str, uri: &str, tenant: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tenant) = tenant {
            builder = builder.header(TENANT_HEADER, tenant);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn connect_body(engine: &str) -> Value {
        json!({
            "type": engine,
            "host": "db.test",
            "database": "shop",
            "username": "app",
            "password": "secret"
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = app(&[])
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_missing_tenant_header() {
        let app = app(&[]);
        let (status, body) = send(&app, request("POST", "/api/connect", None, Some(connect_body("mysql")))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unsupported_engine() {
        let app = app(&[]);
        let (status, body) = send(
            &app,
            request("POST", "/api/connect", Some("alice"), Some(connect_body("oracle"))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "UNSUPPORTED_ENGINE");

        let (status, _) = send(&app, request("GET", "/api/connection", Some("alice"), None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_connect_query_disconnect_flow() {
        let app = app(&["SELECT * FROM Orders", "```sql\nSELECT * FROM Orders\n```"]);

        let (status, body) = send(
            &app,
            request("POST", "/api/connect", Some("alice"), Some(connect_body("postgres"))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["connection"]["engine"], "postgres");
        assert_eq!(body["schema"]["tables"], json!(["Customer", "Orders"]));

        let (status, body) = send(&app, request("GET", "/api/schema", Some("alice"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["formatted"].as_str().unwrap().contains("Table Orders:"));

        let (status, body) = send(
            &app,
            request("POST", "/api/query", Some("alice"), Some(json!({"query": "show all orders"}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sql"], "SELECT * FROM Orders");
        assert_eq!(body["candidateSql"], "SELECT * FROM Orders");
        assert_eq!(body["rows"], json!([{"OrderId": 1}]));
        assert_eq!(body["rowCount"], 1);

        let (status, _) = send(&app, request("DELETE", "/api/connection", Some("alice"), None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, request("DELETE", "/api/connection", Some("alice"), None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(
            &app,
            request("POST", "/api/query", Some("alice"), Some(json!({"query": "show all orders"}))),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "NOT_CONNECTED");
    }

    #[tokio::test]
    async fn test_guard_rejection_is_bad_request() {
        let app = app(&["DELETE FROM Orders", "DELETE FROM Orders"]);
        send(
            &app,
            request("POST", "/api/connect", Some("alice"), Some(connect_body("mysql"))),
        )
        .await;

        let (status, body) = send(
            &app,
            request("POST", "/api/query", Some("alice"), Some(json!({"query": "remove all orders"}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_SQL");
    }
}

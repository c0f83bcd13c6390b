//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .merge(handlers::workflow::workflow_routes())
        .merge(handlers::template::template_routes());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn two_step_workflow() -> Value {
        json!({
            "name": "greet",
            "steps": [
                { "id": "hello", "name": "Hello", "node_type": "log_message",
                  "inputs": { "message": "hello" } },
                { "id": "bye", "name": "Bye", "node_type": "log_message",
                  "inputs": { "message": "bye" } }
            ],
            "dependencies": { "bye": ["hello"] }
        })
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let router = build_router(AppState::in_memory());
        let (status, body) = send(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn create_then_read_status() {
        let router = build_router(AppState::in_memory());

        let (status, body) =
            send(&router, Method::POST, "/api/v1/workflows", Some(two_step_workflow())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "pending");
        assert_eq!(body["data"]["total_steps"], 2);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) =
            send(&router, Method::GET, &format!("/api/v1/workflows/{id}/status"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["run"]["workflow_id"], id.as_str());

        let (status, body) =
            send(&router, Method::GET, &format!("/api/v1/workflows/{id}/plan"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (_, body) = send(&router, Method::GET, "/api/v1/workflows", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cyclic_definition_is_rejected() {
        let router = build_router(AppState::in_memory());
        let body = json!({
            "name": "loop",
            "steps": [
                { "id": "a", "name": "A", "node_type": "log_message" },
                { "id": "b", "name": "B", "node_type": "log_message" }
            ],
            "dependencies": { "a": ["b"], "b": ["a"] }
        });

        let (status, body) = send(&router, Method::POST, "/api/v1/workflows", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "INVALID_DEFINITION");

        let (_, body) = send(&router, Method::GET, "/api/v1/workflows", None).await;
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let router = build_router(AppState::in_memory());
        let uri = format!("/api/v1/workflows/{}/status", uuid::Uuid::now_v7());
        let (status, body) = send(&router, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["code"], "WORKFLOW_NOT_FOUND");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn execute_runs_in_background() {
        let router = build_router(AppState::in_memory());
        let (_, body) =
            send(&router, Method::POST, "/api/v1/workflows", Some(two_step_workflow())).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) =
            send(&router, Method::POST, &format!("/api/v1/workflows/{id}/execute"), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let mut last = Value::Null;
        for _ in 0..100 {
            let (_, body) =
                send(&router, Method::GET, &format!("/api/v1/workflows/{id}/status"), None).await;
            last = body["data"]["status"]["status"].clone();
            if last == "completed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(last, "completed");

        let (_, body) = send(&router, Method::GET, "/api/v1/stats", None).await;
        assert_eq!(body["data"]["completed"], 1);
    }

    #[tokio::test]
    async fn second_execute_while_running_conflicts() {
        let router = build_router(AppState::in_memory());
        let slow = json!({
            "name": "slow",
            "steps": [
                { "id": "nap", "name": "Nap", "node_type": "sleep",
                  "inputs": { "duration": 0.3 } }
            ]
        });
        let (_, body) = send(&router, Method::POST, "/api/v1/workflows", Some(slow)).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/workflows/{id}/execute");

        let (first, _) = send(&router, Method::POST, &uri, None).await;
        let (second, body) = send(&router, Method::POST, &uri, None).await;
        assert_eq!(first, StatusCode::ACCEPTED);
        assert_eq!(second, StatusCode::CONFLICT);
        assert_eq!(body["errors"][0]["code"], "ALREADY_RUNNING");
    }

    #[tokio::test]
    async fn checkpoints_round_trip() {
        let router = build_router(AppState::in_memory());
        let (_, body) =
            send(&router, Method::POST, "/api/v1/workflows", Some(two_step_workflow())).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();
        let base = format!("/api/v1/workflows/{id}/checkpoints");

        let (status, _) = send(
            &router,
            Method::POST,
            &base,
            Some(json!({ "name": "before", "payload": { "cursor": 7 } })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&router, Method::GET, &format!("{base}/before"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["cursor"], 7);

        let (status, _) = send(&router, Method::GET, &format!("{base}/missing"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            send(&router, Method::POST, &base, Some(json!({ "name": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn templates_list_and_instantiate() {
        let router = build_router(AppState::in_memory());

        let (status, body) =
            send(&router, Method::GET, "/api/v1/templates?category=testing", None).await;
        assert_eq!(status, StatusCode::OK);
        let keys: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["key"].as_str())
            .collect();
        assert_eq!(keys, vec!["test_generation"]);

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/templates/bug_fix/instantiate",
            Some(json!({ "inputs": { "bug_description": "crash", "project_path": "." } })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["template_key"], "bug_fix");

        let (status, body) =
            send(&router, Method::POST, "/api/v1/templates/nope/instantiate", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["code"], "TEMPLATE_NOT_FOUND");
    }

    #[tokio::test]
    async fn nodes_lists_builtins() {
        let router = build_router(AppState::in_memory());
        let (_, body) = send(&router, Method::GET, "/api/v1/nodes", None).await;
        let nodes = body["data"].as_array().unwrap();
        assert!(nodes.iter().any(|n| n == "log_message"));
        assert!(nodes.iter().any(|n| n == "scan_project"));
    }
}

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use facerelay_api::config::ServerConfig;
use facerelay_api::router::build_app_router;
use facerelay_api::state::AppState;
use facerelay_comfyui::poll::PollConfig;
use facerelay_pipeline::{Orchestrator, OrchestratorConfig};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        request_timeout_secs: 30,
        max_body_bytes: 8 * 1024 * 1024,
    }
}

/// Build the full application router against the engine at `comfy_url`
/// and the template at `workflow_path`.
///
/// Uses the same [`build_app_router`] as `main.rs` so the tests exercise
/// the production middleware stack.
pub fn build_test_app(comfy_url: &str, workflow_path: &Path) -> Router {
    let pipeline_config = OrchestratorConfig {
        comfy_url: comfy_url.to_string(),
        workflow_path: workflow_path.to_path_buf(),
        poll: PollConfig {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        },
        max_poll_timeout: Duration::from_secs(20),
        ..OrchestratorConfig::default()
    };
    let config = test_config();
    config.check_pipeline(&pipeline_config).unwrap();
    let orchestrator = Orchestrator::from_config(&pipeline_config).unwrap();

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        config: Arc::new(config.clone()),
    };
    build_app_router(state, &config)
}

/// Send a GET request.
pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a raw body.
pub async fn post_raw(app: Router, uri: &str, body: impl Into<Body>) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: Router, uri: &str, body: &Value) -> Response {
    post_raw(app, uri, body.to_string()).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

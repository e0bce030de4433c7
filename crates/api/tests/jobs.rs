//! Integration tests for `POST /run`.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{body_json, post_json, post_raw};
use facerelay_core::media::encode_artifact;

/// 1x1 transparent PNG.
const PIXEL_PNG_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

fn two_loader_template() -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().unwrap();
    let workflow = json!({
        "1": { "class_type": "LoadImage", "inputs": { "image": "src.png" } },
        "2": { "class_type": "LoadImage", "inputs": { "image": "tgt.png" } },
        "3": { "class_type": "SaveImage", "inputs": { "filename_prefix": "swap" } }
    });
    std::fs::write(file.path(), workflow.to_string()).unwrap();
    file
}

// ---------------------------------------------------------------------------
// Test: a complete job returns the encoded artifact
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_returns_encoded_outputs() {
    let engine = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "uploaded.png" })))
        .expect(2)
        .mount(&engine)
        .await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prompt_id": "job-1" })))
        .expect(1)
        .mount(&engine)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job-1": { "outputs": { "3": { "images": [ { "filename": "swap_00001_.png" } ] } } }
        })))
        .mount(&engine)
        .await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"result".to_vec()))
        .mount(&engine)
        .await;

    let template = two_loader_template();
    let app = common::build_test_app(&engine.uri(), template.path());
    let response = post_json(
        app,
        "/run",
        &json!({ "input": { "source_b64": PIXEL_PNG_B64, "target_b64": PIXEL_PNG_B64 } }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "status": "ok",
            "outputs_base64": [encode_artifact(b"result")],
            "count": 1,
            "prompt_id": "job-1"
        })
    );
}

// ---------------------------------------------------------------------------
// Test: failures are 200 responses with an error payload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_input_is_reported_in_body() {
    let engine = MockServer::start().await;
    let template = two_loader_template();
    let app = common::build_test_app(&engine.uri(), template.path());

    let response = post_json(app, "/run", &json!({ "id": "abc" })).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "InputError: Missing input payload." })
    );
    assert!(engine.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_json_is_input_error() {
    let engine = MockServer::start().await;
    let template = two_loader_template();
    let app = common::build_test_app(&engine.uri(), template.path());

    let response = post_raw(app, "/run", "{ not json").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("InputError: Request body is not valid JSON"));
}

#[tokio::test]
async fn engine_failure_is_reported_in_body() {
    let engine = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/image"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&engine)
        .await;

    let template = two_loader_template();
    let app = common::build_test_app(&engine.uri(), template.path());
    let response = post_json(
        app,
        "/run",
        &json!({ "input": { "source_b64": PIXEL_PNG_B64, "target_b64": PIXEL_PNG_B64 } }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("SubmissionError: Upload failed"));
}

// ---------------------------------------------------------------------------
// Test: request size and timeout bounds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn photo_sized_body_reaches_the_engine() {
    let engine = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/image"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&engine)
        .await;

    let template = two_loader_template();
    let app = common::build_test_app(&engine.uri(), template.path());
    let large_source = "A".repeat(3 * 1024 * 1024);
    let response = post_json(
        app,
        "/run",
        &json!({ "input": { "source_b64": large_source, "target_b64": PIXEL_PNG_B64 } }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("SubmissionError: Upload failed"));
}

#[tokio::test]
async fn oversized_body_is_input_error() {
    let engine = MockServer::start().await;
    let template = two_loader_template();
    let app = common::build_test_app(&engine.uri(), template.path());
    let limit = common::test_config().max_body_bytes;

    let huge_source = "A".repeat(limit + 4);
    let response = post_json(
        app,
        "/run",
        &json!({ "input": { "source_b64": huge_source, "target_b64": PIXEL_PNG_B64 } }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "error": format!("InputError: Request body exceeds {limit} bytes") })
    );
    assert!(engine.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn timeout_beyond_job_maximum_is_input_error() {
    let engine = MockServer::start().await;
    let template = two_loader_template();
    let app = common::build_test_app(&engine.uri(), template.path());

    let response = post_json(
        app,
        "/run",
        &json!({ "input": {
            "source_b64": PIXEL_PNG_B64,
            "target_b64": PIXEL_PNG_B64,
            "timeout_secs": 3600
        } }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "InputError: timeout_secs must not exceed 20" })
    );
    assert!(engine.received_requests().await.unwrap().is_empty());
}

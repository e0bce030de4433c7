//! Handler for running face-swap jobs.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use facerelay_core::request::{JobOutput, JobResponse};
use facerelay_core::OrchestrationError;
use serde_json::Value;

use crate::state::AppState;

/// POST /run
///
/// Accepts the worker envelope `{"input": {...}}` and runs the job to
/// completion. Always answers 200: failures are reported in the body as
/// `{"error": "<kind>: <message>"}`, including an oversized or
/// unparseable request.
pub async fn run_job(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Json<JobResponse> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return rejected(OrchestrationError::Input(format!(
                "Request body exceeds {} bytes",
                state.config.max_body_bytes
            )));
        }
        Err(rejection) => {
            return rejected(OrchestrationError::Input(format!(
                "Request body could not be read: {}",
                rejection.body_text()
            )));
        }
    };

    let event: Value = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            return rejected(OrchestrationError::Input(format!(
                "Request body is not valid JSON: {e}"
            )));
        }
    };

    Json(state.orchestrator.handle_event(&event).await)
}

fn rejected(error: OrchestrationError) -> Json<JobResponse> {
    tracing::warn!(error = %error, "Rejected job request");
    Json(JobResponse::from(Err::<JobOutput, _>(error)))
}

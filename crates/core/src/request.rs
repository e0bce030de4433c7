//! Job payloads: what callers send in and what they get back.
//!
//! Inbound jobs arrive in the worker envelope `{"input": {...}}`. The
//! input is validated into a [`JobRequest`] before any network traffic
//! happens. Results go back as a [`JobResponse`], which is either the
//! success body or `{"error": "<kind>: <message>"}`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OrchestrationError;
use crate::media::MediaReference;
use crate::planner::NodeMapping;

/// Status tag of a successful job.
pub const STATUS_OK: &str = "ok";

/// Raw job input as sent by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobInput {
    #[serde(default)]
    pub source_b64: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub target_b64: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub node_mapping: Option<Value>,
    /// Overrides the configured polling ceiling for this job.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// A validated job, ready for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub source: MediaReference,
    pub target: MediaReference,
    pub node_mapping: Option<NodeMapping>,
    pub poll_timeout: Option<Duration>,
}

impl JobRequest {
    /// Validate a worker envelope (`{"input": {...}}`).
    pub fn from_event(event: &Value) -> Result<Self, OrchestrationError> {
        match event.get("input") {
            Some(input) if !is_empty_payload(input) => Self::from_input(input),
            _ => Err(OrchestrationError::Input("Missing input payload.".to_string())),
        }
    }

    /// Validate the inner input object.
    pub fn from_input(input: &Value) -> Result<Self, OrchestrationError> {
        if is_empty_payload(input) {
            return Err(OrchestrationError::Input("Missing input payload.".to_string()));
        }
        let raw: JobInput = serde_json::from_value(input.clone())
            .map_err(|e| OrchestrationError::Input(format!("Invalid input payload: {e}")))?;

        let source = media_reference(raw.source_b64, raw.source_url, "source")?;
        let target = media_reference(raw.target_b64, raw.target_url, "target")?;
        let node_mapping = raw.node_mapping.map(parse_node_mapping).transpose()?.flatten();

        Ok(Self {
            source,
            target,
            node_mapping,
            poll_timeout: raw.timeout_secs.map(Duration::from_secs),
        })
    }
}

/// Inline data wins when both forms are supplied.
fn media_reference(
    b64: Option<String>,
    url: Option<String>,
    role: &str,
) -> Result<MediaReference, OrchestrationError> {
    match (b64, url) {
        (Some(data), _) => Ok(MediaReference::Inline(data)),
        (None, Some(url)) => Ok(MediaReference::Url(url)),
        (None, None) => Err(OrchestrationError::Input(format!(
            "Provide '{role}_b64' or '{role}_url'."
        ))),
    }
}

/// `null` and `{}` mean "discover automatically".
fn parse_node_mapping(value: Value) -> Result<Option<NodeMapping>, OrchestrationError> {
    let obj = match value {
        Value::Null => return Ok(None),
        Value::Object(obj) if obj.is_empty() => return Ok(None),
        Value::Object(obj) => obj,
        _ => {
            return Err(OrchestrationError::Input(
                "node_mapping must be an object.".to_string(),
            ))
        }
    };

    let present = |role: &str| obj.get(role).is_some_and(|v| !is_empty_payload(v));
    if !(present("source") && present("target")) {
        return Err(OrchestrationError::Input(
            "node_mapping must include both 'source' and 'target' entries.".to_string(),
        ));
    }

    serde_json::from_value(Value::Object(obj))
        .map(Some)
        .map_err(|e| OrchestrationError::Input(format!("Invalid node_mapping: {e}")))
}

fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(obj) => obj.is_empty(),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Body of a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    pub status: String,
    pub outputs_base64: Vec<String>,
    pub count: usize,
    pub prompt_id: String,
}

impl JobOutput {
    pub fn new(prompt_id: impl Into<String>, outputs_base64: Vec<String>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            count: outputs_base64.len(),
            outputs_base64,
            prompt_id: prompt_id.into(),
        }
    }
}

/// What the caller receives for every job, success or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResponse {
    Ok(JobOutput),
    Error { error: String },
}

impl From<Result<JobOutput, OrchestrationError>> for JobResponse {
    fn from(result: Result<JobOutput, OrchestrationError>) -> Self {
        match result {
            Ok(output) => Self::Ok(output),
            Err(e) => Self::Error {
                error: e.to_string(),
            },
        }
    }
}

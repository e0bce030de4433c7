//! ComfyUI REST response shapes and decoders.
//!
//! The engine's JSON varies between versions and forks, so each response
//! we depend on is decoded by a single function that accepts every shape
//! seen in the wild and reports anything else as
//! [`ComfyUIApiError::Protocol`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ComfyUIApiError;

/// Response members that may carry the queued prompt id, in priority order.
const PROMPT_ID_FIELDS: [&str; 3] = ["prompt_id", "promptId", "id"];

/// Default `type` of an output image when the engine omits it.
const DEFAULT_OUTPUT_TYPE: &str = "output";

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// JSON forms of a `POST /upload/image` reply.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UploadReply {
    /// `{"name": "source.png", "subfolder": "", "type": "input"}`
    Object(StoredAsset),
    /// `[{"name": "source.png"}, ...]`
    Array(Vec<StoredAsset>),
    /// `"source.png"`
    Bare(String),
}

#[derive(Debug, Deserialize)]
struct StoredAsset {
    name: String,
}

/// Extract the stored filename from an upload reply body.
///
/// Accepts a JSON object with `name`, an array whose first element has
/// `name`, a bare JSON string, or a non-JSON plain-text body that is the
/// filename itself.
pub fn decode_upload_handle(body: &str) -> Result<String, ComfyUIApiError> {
    let handle = match serde_json::from_str::<UploadReply>(body) {
        Ok(UploadReply::Object(asset)) => Some(asset.name),
        Ok(UploadReply::Array(assets)) => assets.into_iter().next().map(|asset| asset.name),
        Ok(UploadReply::Bare(name)) => Some(name),
        Err(_) if serde_json::from_str::<Value>(body).is_err() => {
            Some(body.trim().to_string())
        }
        Err(_) => None,
    };

    match handle {
        Some(name) if !name.trim().is_empty() => Ok(name),
        _ => Err(ComfyUIApiError::Protocol(format!(
            "Unexpected upload response: {}",
            truncate_for_log(body)
        ))),
    }
}

// ---------------------------------------------------------------------------
// Prompt submission
// ---------------------------------------------------------------------------

/// Extract the job id from a `POST /prompt` reply.
///
/// String ids are taken as-is; numeric ids are stringified.
pub fn extract_prompt_id(body: &Value) -> Result<String, ComfyUIApiError> {
    PROMPT_ID_FIELDS
        .iter()
        .filter_map(|field| body.get(field))
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| {
            ComfyUIApiError::Protocol(format!(
                "Missing prompt_id in response: {}",
                truncate_for_log(&body.to_string())
            ))
        })
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One file produced by a finished prompt, retrievable via `GET /view`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    /// Subdirectory under the engine's output folder; empty for the root.
    #[serde(default)]
    pub subfolder: String,
    /// Storage category (`output`, `temp`, ...).
    #[serde(rename = "type", default = "default_output_type")]
    pub category: String,
}

impl OutputImage {
    /// Query parameters for `GET /view`, omitting empty members.
    pub fn view_query(&self) -> Vec<(&'static str, &str)> {
        let mut query = vec![("filename", self.filename.as_str())];
        if !self.subfolder.is_empty() {
            query.push(("subfolder", self.subfolder.as_str()));
        }
        if !self.category.is_empty() {
            query.push(("type", self.category.as_str()));
        }
        query
    }
}

fn default_output_type() -> String {
    DEFAULT_OUTPUT_TYPE.to_string()
}

/// Wire form of an image entry; `null` members fall back like absent ones.
#[derive(Debug, Deserialize)]
struct RawOutputImage {
    filename: String,
    #[serde(default)]
    subfolder: Option<String>,
    #[serde(default, rename = "type")]
    category: Option<String>,
}

impl From<RawOutputImage> for OutputImage {
    fn from(raw: RawOutputImage) -> Self {
        Self {
            filename: raw.filename,
            subfolder: raw.subfolder.unwrap_or_default(),
            category: raw.category.unwrap_or_else(default_output_type),
        }
    }
}

/// Collect every output image recorded for `prompt_id`.
///
/// The entry is looked up under `history[prompt_id]`, falling back to a
/// top-level `[prompt_id]` member. Images are flattened in output-node
/// order, then in order within each node. An absent entry yields an empty
/// list (the job is not finished yet).
pub fn extract_output_images(
    body: &Value,
    prompt_id: &str,
) -> Result<Vec<OutputImage>, ComfyUIApiError> {
    let entry = body
        .get("history")
        .and_then(|history| history.get(prompt_id))
        .or_else(|| body.get(prompt_id));

    let Some(outputs) = entry
        .and_then(|entry| entry.get("outputs"))
        .and_then(Value::as_object)
    else {
        return Ok(Vec::new());
    };

    let mut images = Vec::new();
    for (node_id, node_output) in outputs {
        let Some(entries) = node_output.get("images").and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            let raw: RawOutputImage = serde_json::from_value(entry.clone()).map_err(|e| {
                ComfyUIApiError::Protocol(format!(
                    "Malformed output image in node {node_id}: {e}"
                ))
            })?;
            images.push(OutputImage::from(raw));
        }
    }
    Ok(images)
}

fn truncate_for_log(text: &str) -> String {
    const MAX: usize = 200;
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

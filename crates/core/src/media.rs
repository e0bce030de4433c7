//! Caller-supplied input media.
//!
//! A job names each input image either inline (base64, optionally as a
//! `data:` URI) or by remote URL. Inline data is decoded here; remote
//! retrieval needs an HTTP client and lives in the pipeline crate.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::OrchestrationError;

/// Where the bytes of one input image come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaReference {
    /// Base64 payload, possibly prefixed with `data:<mime>;base64,`.
    Inline(String),
    /// `http(s)://` location to download from.
    Url(String),
}

impl MediaReference {
    /// Short description for logs; never includes the inline payload.
    pub fn describe(&self) -> String {
        match self {
            Self::Inline(data) => format!("inline ({} chars)", data.len()),
            Self::Url(url) => url.clone(),
        }
    }
}

/// Decode inline base64 image data into raw bytes.
///
/// A leading data-URI header is stripped up to and including the first
/// comma, and embedded whitespace (line-wrapped payloads) is ignored.
pub fn decode_inline(data: &str) -> Result<Vec<u8>, OrchestrationError> {
    let trimmed = data.trim();
    let payload = if trimmed.starts_with("data:") {
        match trimmed.split_once(',') {
            Some((_, rest)) => rest,
            None => {
                return Err(OrchestrationError::Input(
                    "data URI is missing the ',' separator".to_string(),
                ))
            }
        }
    } else {
        trimmed
    };

    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Err(OrchestrationError::Input(
            "inline image data is empty".to_string(),
        ));
    }

    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| OrchestrationError::Input(format!("invalid base64 image data: {e}")))
}

/// Encode produced artifact bytes for the JSON response.
pub fn encode_artifact(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

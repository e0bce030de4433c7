//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the endpoints a face-swap job touches (image upload, workflow
//! submission, history polling, output download) using [`reqwest`].

use serde::Serialize;

use crate::responses::{decode_upload_handle, extract_prompt_id, OutputImage};

/// Multipart field name ComfyUI expects for uploaded images.
const UPLOAD_FIELD: &str = "image";

/// HTTP client for a single ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Result of one `GET /history/{prompt_id}` call.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryPoll {
    /// 404: the prompt is not indexed yet.
    NotFound,
    /// 2xx with the raw history body.
    Found(serde_json::Value),
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// ComfyUI answered 2xx but the body has none of the accepted shapes.
    #[error("Unexpected ComfyUI response: {0}")]
    Protocol(String),
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for sharing timeouts and the connection pool).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        let api_url = api_url.trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    /// Base HTTP URL without a trailing slash.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Upload raw image bytes to the engine's input folder.
    ///
    /// Sends a multipart `POST /upload/image` and returns the stored
    /// filename to reference from `LoadImage`-style nodes.
    pub async fn upload_image(
        &self,
        name_hint: &str,
        data: Vec<u8>,
    ) -> Result<String, ComfyUIApiError> {
        let part = reqwest::multipart::Part::bytes(data)
            .file_name(name_hint.to_string())
            .mime_str("application/octet-stream")?;
        let form = reqwest::multipart::Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(format!("{}/upload/image", self.api_url))
            .multipart(form)
            .send()
            .await?;

        let body = Self::ensure_success(response).await?.text().await?;
        let handle = decode_upload_handle(&body)?;
        tracing::debug!(name_hint, handle = %handle, "Uploaded image to ComfyUI");
        Ok(handle)
    }

    /// Submit a workflow document as the raw `POST /prompt` body.
    ///
    /// Returns the server-assigned prompt id.
    pub async fn submit_graph<T: Serialize + ?Sized>(
        &self,
        workflow: &T,
    ) -> Result<String, ComfyUIApiError> {
        self.post_prompt(workflow).await
    }

    /// Submit a workflow wrapped in the stock `{"prompt", "client_id"}`
    /// envelope.
    pub async fn submit_workflow<T: Serialize + ?Sized>(
        &self,
        workflow: &T,
        client_id: &str,
    ) -> Result<String, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });
        self.post_prompt(&body).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request. A 404 means the prompt
    /// is not indexed yet and is reported as [`HistoryPoll::NotFound`].
    pub async fn get_history(&self, prompt_id: &str) -> Result<HistoryPoll, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(HistoryPoll::NotFound);
        }
        let body = Self::parse_response(response).await?;
        Ok(HistoryPoll::Found(body))
    }

    /// Download the bytes of one output image via `GET /view`.
    pub async fn fetch_output(&self, image: &OutputImage) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&image.view_query())
            .send()
            .await?;

        let bytes = Self::ensure_success(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    // ---- private helpers ----

    async fn post_prompt<T: Serialize + ?Sized>(
        &self,
        body: &T,
    ) -> Result<String, ComfyUIApiError> {
        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(body)
            .send()
            .await?;

        let reply: serde_json::Value = Self::parse_response(response).await?;
        extract_prompt_id(&reply)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body, treating undecodable
    /// bodies as protocol violations.
    async fn parse_response(
        response: reqwest::Response,
    ) -> Result<serde_json::Value, ComfyUIApiError> {
        let text = Self::ensure_success(response).await?.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ComfyUIApiError::Protocol(format!("invalid JSON body: {e}")))
    }
}

//! Turns a job's [`MediaReference`] into raw image bytes.

use facerelay_core::media::{decode_inline, MediaReference};
use facerelay_core::OrchestrationError;

/// Resolves inline or remote input media.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    client: reqwest::Client,
}

impl AssetResolver {
    /// `client` should carry the configured connect/read timeouts.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Produce the bytes behind `media`.
    ///
    /// Inline data fails with `InputError`; any download failure,
    /// including a non-2xx status, is a `FetchError`. Nothing is retried.
    pub async fn resolve(&self, media: &MediaReference) -> Result<Vec<u8>, OrchestrationError> {
        match media {
            MediaReference::Inline(data) => decode_inline(data),
            MediaReference::Url(url) => self.download(url).await,
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, OrchestrationError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OrchestrationError::Fetch(format!("Failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestrationError::Fetch(format!(
                "Failed to fetch {url}: HTTP {}",
                status.as_u16()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| OrchestrationError::Fetch(format!("Failed to read {url}: {e}")))?;
        tracing::debug!(url, bytes = bytes.len(), "Downloaded input media");
        Ok(bytes.to_vec())
    }
}

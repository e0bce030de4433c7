use facerelay_core::OrchestrationError;
use facerelay_pipeline::OrchestratorConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults; the job pipeline itself is
/// configured separately through `OrchestratorConfig`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Whole-request timeout in seconds (default: `900`). Must exceed the
    /// longest poll ceiling a job may ask for.
    pub request_timeout_secs: u64,
    /// Largest accepted request body in bytes (default: 64 MiB).
    pub max_body_bytes: usize,
}

const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default    |
    /// |------------------------|------------|
    /// | `HOST`                 | `0.0.0.0`  |
    /// | `PORT`                 | `8000`     |
    /// | `REQUEST_TIMEOUT_SECS` | `900`      |
    /// | `MAX_BODY_BYTES`       | `67108864` |
    pub fn from_env() -> Result<Self, OrchestrationError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .map_err(|e| OrchestrationError::Config(format!("PORT must be a valid u16: {e}")))?;

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "900".into())
            .parse()
            .map_err(|e| {
                OrchestrationError::Config(format!("REQUEST_TIMEOUT_SECS must be a valid u64: {e}"))
            })?;

        let max_body_bytes: usize = match std::env::var("MAX_BODY_BYTES") {
            Ok(raw) => raw.trim().parse().map_err(|e| {
                OrchestrationError::Config(format!("MAX_BODY_BYTES must be a valid usize: {e}"))
            })?,
            Err(_) => DEFAULT_MAX_BODY_BYTES,
        };

        Ok(Self {
            host,
            port,
            request_timeout_secs,
            max_body_bytes,
        })
    }

    /// Reject pipeline settings whose poll ceilings would outlast the
    /// server's own request timeout.
    pub fn check_pipeline(&self, pipeline: &OrchestratorConfig) -> Result<(), OrchestrationError> {
        let ceilings = [
            ("POLL_TIMEOUT_SECS", pipeline.poll.timeout.as_secs()),
            ("POLL_TIMEOUT_MAX_SECS", pipeline.max_poll_timeout.as_secs()),
        ];
        for (key, secs) in ceilings {
            if secs >= self.request_timeout_secs {
                return Err(OrchestrationError::Config(format!(
                    "{key} ({secs}) must be below REQUEST_TIMEOUT_SECS ({})",
                    self.request_timeout_secs
                )));
            }
        }
        Ok(())
    }
}

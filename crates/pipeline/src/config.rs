use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use facerelay_comfyui::poll::PollConfig;
use facerelay_core::OrchestrationError;

const DEFAULT_COMFY_URL: &str = "http://127.0.0.1:8188";
const DEFAULT_WORKFLOW_PATH: &str = "/workspace/comfyui/workflows/APIAutoFaceACE.json";

/// Orchestrator configuration loaded from environment variables.
///
/// All fields have defaults matching the stock worker image, so an empty
/// environment yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Engine base URL without a trailing slash.
    pub comfy_url: String,
    /// Workflow template document.
    pub workflow_path: PathBuf,
    /// Parse the template once at startup instead of on every job.
    pub cache_workflow: bool,
    /// Connect timeout for all outbound HTTP.
    pub connect_timeout: Duration,
    /// Per-read timeout for all outbound HTTP. A slow but steady body is
    /// not cut off.
    pub read_timeout: Duration,
    /// History polling cadence and default ceiling.
    pub poll: PollConfig,
    /// Largest poll ceiling a job may ask for with `timeout_secs`.
    pub max_poll_timeout: Duration,
    /// Submit `{"prompt": graph, "client_id": ..}` instead of the bare graph.
    pub prompt_envelope: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            comfy_url: DEFAULT_COMFY_URL.to_string(),
            workflow_path: PathBuf::from(DEFAULT_WORKFLOW_PATH),
            cache_workflow: false,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(60),
            poll: PollConfig::default(),
            max_poll_timeout: Duration::from_secs(600),
            prompt_envelope: false,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                                            |
    /// |-----------------------------|----------------------------------------------------|
    /// | `COMFY_URL`                 | `http://127.0.0.1:8188`                            |
    /// | `WORKFLOW_PATH`             | `/workspace/comfyui/workflows/APIAutoFaceACE.json` |
    /// | `WORKFLOW_CACHE`            | `false`                                            |
    /// | `HTTP_CONNECT_TIMEOUT_SECS` | `5`                                                |
    /// | `HTTP_READ_TIMEOUT_SECS`    | `60`                                               |
    /// | `POLL_INTERVAL_MS`          | `800`                                              |
    /// | `POLL_TIMEOUT_SECS`         | `300`                                              |
    /// | `POLL_TIMEOUT_MAX_SECS`     | `600`                                              |
    /// | `COMFY_PROMPT_ENVELOPE`     | `false`                                            |
    pub fn from_env() -> Result<Self, OrchestrationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OrchestrationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let comfy_url = var("COMFY_URL")
            .unwrap_or(defaults.comfy_url)
            .trim()
            .trim_end_matches('/')
            .to_string();

        let workflow_path = var("WORKFLOW_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.workflow_path);

        let cache_workflow = parse_flag("WORKFLOW_CACHE", var("WORKFLOW_CACHE"), false)?;
        let prompt_envelope =
            parse_flag("COMFY_PROMPT_ENVELOPE", var("COMFY_PROMPT_ENVELOPE"), false)?;

        let connect_timeout = Duration::from_secs(parse_number(
            "HTTP_CONNECT_TIMEOUT_SECS",
            var("HTTP_CONNECT_TIMEOUT_SECS"),
            defaults.connect_timeout.as_secs(),
        )?);
        let read_timeout = Duration::from_secs(parse_number(
            "HTTP_READ_TIMEOUT_SECS",
            var("HTTP_READ_TIMEOUT_SECS"),
            defaults.read_timeout.as_secs(),
        )?);

        let poll = PollConfig {
            interval: Duration::from_millis(parse_number(
                "POLL_INTERVAL_MS",
                var("POLL_INTERVAL_MS"),
                800,
            )?),
            timeout: Duration::from_secs(parse_number(
                "POLL_TIMEOUT_SECS",
                var("POLL_TIMEOUT_SECS"),
                defaults.poll.timeout.as_secs(),
            )?),
        };
        let max_poll_timeout = Duration::from_secs(parse_number(
            "POLL_TIMEOUT_MAX_SECS",
            var("POLL_TIMEOUT_MAX_SECS"),
            defaults.max_poll_timeout.as_secs(),
        )?);

        let config = Self {
            comfy_url,
            workflow_path,
            cache_workflow,
            connect_timeout,
            read_timeout,
            poll,
            max_poll_timeout,
            prompt_envelope,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the polling settings against each other.
    ///
    /// The interval must be sub-second and non-zero, and the default
    /// ceiling may not exceed the per-job maximum.
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        let interval_ms = self.poll.interval.as_millis();
        if !(1..=999).contains(&interval_ms) {
            return Err(OrchestrationError::Config(format!(
                "POLL_INTERVAL_MS must be between 1 and 999, got {interval_ms}"
            )));
        }
        if self.poll.timeout > self.max_poll_timeout {
            return Err(OrchestrationError::Config(format!(
                "POLL_TIMEOUT_SECS ({}) must not exceed POLL_TIMEOUT_MAX_SECS ({})",
                self.poll.timeout.as_secs(),
                self.max_poll_timeout.as_secs()
            )));
        }
        Ok(())
    }

    /// Build the HTTP client shared by media download and the engine API.
    pub fn http_client(&self) -> Result<reqwest::Client, OrchestrationError> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .build()
            .map_err(|e| OrchestrationError::Config(format!("Failed to build HTTP client: {e}")))
    }
}

fn parse_number<T>(key: &str, raw: Option<String>, default: T) -> Result<T, OrchestrationError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            OrchestrationError::Config(format!("{key} must be a non-negative integer: {e}"))
        }),
    }
}

fn parse_flag(key: &str, raw: Option<String>, default: bool) -> Result<bool, OrchestrationError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(OrchestrationError::Config(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

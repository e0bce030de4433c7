/// Every way a face-swap job can fail.
///
/// Each stage of the pipeline fails fast with exactly one of these. The
/// `Display` form (`"<kind>: <message>"`) is what callers receive in the
/// `error` field of a failed job response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestrationError {
    /// Malformed or missing caller payload.
    #[error("InputError: {0}")]
    Input(String),

    /// Remote media or output artifact could not be retrieved.
    #[error("FetchError: {0}")]
    Fetch(String),

    /// The engine answered with a body we cannot interpret.
    #[error("ProtocolError: {0}")]
    Protocol(String),

    /// Workflow template missing or unparseable, or bad settings.
    #[error("ConfigError: {0}")]
    Config(String),

    /// Injection points could not be determined or applied.
    #[error("PlanningError: {0}")]
    Planning(String),

    /// The engine rejected an upload, submission or status query.
    #[error("SubmissionError: {0}")]
    Submission(String),

    /// The job produced no output before the polling deadline.
    #[error("TimeoutError: {0}")]
    Timeout(String),
}

impl OrchestrationError {
    /// Taxonomy name of this error, e.g. `"InputError"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input(_) => "InputError",
            Self::Fetch(_) => "FetchError",
            Self::Protocol(_) => "ProtocolError",
            Self::Config(_) => "ConfigError",
            Self::Planning(_) => "PlanningError",
            Self::Submission(_) => "SubmissionError",
            Self::Timeout(_) => "TimeoutError",
        }
    }

    /// The human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Input(m)
            | Self::Fetch(m)
            | Self::Protocol(m)
            | Self::Config(m)
            | Self::Planning(m)
            | Self::Submission(m)
            | Self::Timeout(m) => m,
        }
    }
}

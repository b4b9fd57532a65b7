use thiserror::Error;

#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Scan {0} is already running")]
    AlreadyRunning(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Run is not active: {0}")]
    NotRunning(String),

    #[error("Tool bridge unavailable: {0}")]
    ToolBridgeUnavailable(String),

    #[error("Tool call failed: {0}")]
    Tool(String),

    #[error("Decision provider error: {0}")]
    Provider(String),

    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: {0}")]
    RateLimit(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("All {0} pool workers failed")]
    AllWorkersFailed(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PilotError {
    /// True for errors the calling layer should report as a rejected request
    /// rather than a failed run.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Precondition(_) | Self::AlreadyRunning(_) | Self::NotRunning(_) | Self::NotFound(_)
        )
    }
}

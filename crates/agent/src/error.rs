use apex_core::error::CoreError;

/// Errors raised by the patch pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport or HTTP failure talking to the LLM provider.
    #[error("LLM request failed: {0}")]
    Llm(String),

    /// Failure talking to the source-control API.
    #[error("Source control error: {0}")]
    SourceControl(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every generation attempt was rejected; `message` is the last
    /// formatted validation message.
    #[error("Patch generation failed after {attempts} attempts: {message}")]
    GenerationFailed { attempts: u32, message: String },

    /// The patch failed validation at apply time.
    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    /// A file action failed; the backup has already been restored.
    #[error("Failed to apply patch: {0}")]
    Apply(String),

    #[error("No backup available to roll back patch {0}")]
    RollbackUnavailable(String),

    #[error("Patch not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<sqlx::Error> for AgentError {
    fn from(err: sqlx::Error) -> Self {
        AgentError::Storage(err.to_string())
    }
}

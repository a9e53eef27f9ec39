use thiserror::Error;

/// Failures of the durable key-value layer.
///
/// None of these reach store callers: the store logs them and keeps running
/// in memory.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown model id: {0}")]
    UnknownModel(String),

    #[error("unknown agent mode: {0} (expected vision-enhanced or text-only)")]
    UnknownAgentMode(String),

    #[error("unknown provider: {0} (expected openai, anthropic or gemini)")]
    UnknownProvider(String),
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The backing store for a corpus/field has not been loaded. Fatal for a run.
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// The query normalized to nothing; callers skip the field or channel.
    #[error("Empty query")]
    EmptyQuery,

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Adjudication timed out after {0} ms")]
    AdjudicationTimeout(u64),

    #[error("Adjudication failed: {message}")]
    AdjudicationFailure { message: String, transient: bool },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn adjudication(message: impl Into<String>, transient: bool) -> Self {
        Self::AdjudicationFailure { message: message.into(), transient }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::AdjudicationTimeout(_) => true,
            Self::AdjudicationFailure { transient, .. } => *transient,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

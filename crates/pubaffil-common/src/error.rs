use thiserror::Error;

#[derive(Debug, Error)]
pub enum PubaffilError {
    /// Bad ruleset or configuration. Raised before any network activity.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The retrieval collaborator kept failing for one query.
    #[error("Fetch failed for query '{query}' after {attempts} attempt(s): {message}")]
    Fetch {
        query: String,
        attempts: u32,
        message: String,
    },

    /// A retrieved record without an extractable identifier.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Export to {path} failed: {message}")]
    Export { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PubaffilError {
    pub fn config(msg: impl Into<String>) -> Self {
        PubaffilError::Config(msg.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, PubaffilError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, PubaffilError>;

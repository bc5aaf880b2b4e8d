use mapping_service::ServiceError;
use mapping_tree::TreeError;
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EditorError>;

/// One generated rule that could not be stored.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub rule: Value,
    pub error: ServiceError,
}

#[derive(Error, Debug)]
pub enum EditorError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Some rules of a batch were created, these were not.
    #[error("Could not create rules. {} of them failed", failures.len())]
    PartialBatchFailure { failures: Vec<BatchFailure> },

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Invalid configuration value for {key}: {message}")]
    Config { key: String, message: String },

    #[error("Editor is shut down")]
    Closed,
}

impl EditorError {
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        EditorError::Config {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

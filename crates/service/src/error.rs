use mapping_protocol::ErrorBody;
use mapping_tree::TreeError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response with the structured error body.
    #[error("Service error ({status}): {body}")]
    Service { status: u16, body: ErrorBody },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl ServiceError {
    pub fn service(status: u16, title: impl Into<String>, detail: impl Into<String>) -> Self {
        ServiceError::Service {
            status,
            body: ErrorBody::new(title, detail),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 404 whose body says nothing more than "Not Found".
    pub fn is_plain_not_found(&self) -> bool {
        matches!(self, ServiceError::Service { status: 404, body } if body.is_not_found())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else {
            ServiceError::Network(err.to_string())
        }
    }
}

/// Tree errors of the in-memory backend surface the way the HTTP service
/// reports them.
impl From<TreeError> for ServiceError {
    fn from(err: TreeError) -> Self {
        let status = match err {
            TreeError::RuleNotFound(_) => 404,
            _ => 400,
        };
        let title = if status == 404 { "Not Found" } else { "Bad Request" };
        ServiceError::service(status, title, err.to_string())
    }
}

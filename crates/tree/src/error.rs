use mapping_protocol::RuleKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TreeError>;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Invalid root: {0}")]
    InvalidRoot(String),

    #[error("Duplicate rule id: {0}")]
    DuplicateId(String),

    #[error("Rule without id below {parent}")]
    MissingId { parent: String },

    #[error("Rule {id} of type {kind} cannot appear at this position")]
    MisplacedRule { id: String, kind: RuleKind },

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Rule {0} is not a root or object rule")]
    NotAContainer(String),

    #[error("Invalid child order for {parent}: {reason}")]
    InvalidOrder { parent: String, reason: String },

    #[error("The root rule cannot be removed")]
    CannotRemoveRoot,

    #[error("Patch error: {0}")]
    Patch(#[from] serde_json::Error),
}

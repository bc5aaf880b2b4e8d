//! Access to the backend rule service.
//!
//! [`RuleService`] is the seam the editor talks to. [`HttpRuleService`]
//! speaks the REST API, [`InMemoryRuleService`] keeps a tree in memory
//! (optionally backed by a JSON fixture file) and doubles as a test backend.

pub mod error;
pub mod http;
pub mod labels;
pub mod memory;
pub mod payload;
pub mod service;

pub use error::{Result, ServiceError};
pub use http::HttpRuleService;
pub use labels::{LabelField, VocabularyLabelCache};
pub use memory::{Fixture, InMemoryRuleService, Operation};
pub use payload::{
    check_path_expression, check_uri_pattern, ObjectRuleForm, PatternChange, ValueRuleForm,
};
pub use service::{RuleService, TaskRef};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod request;
pub mod rule;
pub mod suggestion;

pub use request::{
    CopyRuleRequest, CopyRuleResponse, GenericInfo, ParseError, PathValidationRequest, TermInfo,
    UriPatternValidationRequest, ValidationResult,
};
pub use rule::{
    ChildRules, ContainerRule, MappingRule, MappingTarget, Metadata, RuleKind, TypeRule, UriRule,
    ValueRule, ValueType, ROOT_RULE_ID,
};
pub use suggestion::{
    CandidateKind, Correspondence, GenerateRulesRequest, SourceMatch, SourcePathInfo,
    SuggestionCandidate, SuggestionIssues, SuggestionRequest, SuggestionRow, VocabularyInfo,
    VocabularyInfos, VocabularyMatchResponse,
};

/// Structured error body returned by the rule service on non-2xx responses.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
pub struct ErrorBody {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorBody>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<serde_json::Value>>,
}

impl ErrorBody {
    pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
            cause: None,
            issues: None,
        }
    }

    /// The matching endpoint answers this way when no matcher is installed.
    pub fn is_not_found(&self) -> bool {
        self.title == "Not Found" && self.detail == "Not Found"
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.title.is_empty(), self.detail.is_empty()) {
            (false, false) if self.title != self.detail => {
                write!(f, "{}: {}", self.title, self.detail)?
            }
            (false, _) => f.write_str(&self.title)?,
            (true, false) => f.write_str(&self.detail)?,
            (true, true) => f.write_str("unknown error")?,
        }
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {cause})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn error_body_display_includes_cause() {
        let mut body = ErrorBody::new("Bad Request", "invalid rule");
        body.cause = Some(Box::new(ErrorBody::new("Parse error", "")));
        assert_eq!(
            body.to_string(),
            "Bad Request: invalid rule (caused by: Parse error)"
        );
    }

    #[test]
    fn not_found_requires_both_fields() {
        assert!(ErrorBody::new("Not Found", "Not Found").is_not_found());
        assert!(!ErrorBody::new("Not Found", "rule missing").is_not_found());
    }
}

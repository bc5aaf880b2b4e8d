use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Copies `source_rule` of another (or the same) task below a container.
///
/// `after_rule_id` is always serialized; `null` appends at the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CopyRuleRequest {
    pub source_project: String,
    pub source_task: String,
    pub source_rule: String,
    #[serde(default)]
    pub after_rule_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CopyRuleResponse {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GenericInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Vocabulary term lookup result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TermInfo {
    #[serde(default)]
    pub generic_info: GenericInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PathValidationRequest {
    pub path_expression: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UriPatternValidationRequest {
    pub uri_pattern: String,
}

/// Position of a syntax error inside the validated input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ParseError {
    pub message: String,
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<ParseError>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            parse_error: None,
        }
    }

    pub fn invalid(message: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            valid: false,
            parse_error: Some(ParseError {
                message: message.into(),
                start,
                end,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_request_keeps_null_after_rule_id() {
        let request = CopyRuleRequest {
            source_project: "p".to_string(),
            source_task: "t".to_string(),
            source_rule: "r1".to_string(),
            after_rule_id: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value["afterRuleId"].is_null());
        assert!(value.as_object().unwrap().contains_key("afterRuleId"));
        assert_eq!(value["sourceRule"], "r1");
    }
}

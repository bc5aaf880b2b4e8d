//! Request payloads built from the rule edit forms, plus the local syntax
//! checks run before the remote validators.

use crate::error::{Result, ServiceError};
use mapping_protocol::{RuleKind, ValidationResult, ValueType};
use regex::Regex;
use serde_json::{json, Map, Value};

/// Edit form of a direct or complex value rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRuleForm {
    /// `None` for a rule that does not exist yet.
    pub id: Option<String>,
    pub kind: Option<RuleKind>,
    pub label: String,
    pub comment: Option<String>,
    pub target_property: String,
    pub value_type: ValueType,
    pub is_attribute: bool,
    pub source_property: Option<String>,
}

impl ValueRuleForm {
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert(
            "metadata".to_string(),
            json!({"description": self.comment, "label": self.label}),
        );
        payload.insert(
            "mappingTarget".to_string(),
            json!({
                "uri": self.target_property,
                "valueType": self.value_type,
                "isAttribute": self.is_attribute,
            }),
        );

        let kind = self.kind.unwrap_or(RuleKind::Direct);
        if kind == RuleKind::Direct {
            payload.insert(
                "sourcePath".to_string(),
                Value::String(self.source_property.clone().unwrap_or_default()),
            );
        }
        if self.id.is_none() || kind == RuleKind::Direct {
            payload.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        }
        Value::Object(payload)
    }
}

/// What to do with the URI pattern of an object rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PatternChange {
    #[default]
    Keep,
    Set(String),
    /// Drops the URI rule so the default URI scheme applies.
    Clear,
}

/// Edit form of an object rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectRuleForm {
    pub id: Option<String>,
    pub label: String,
    pub comment: Option<String>,
    pub target_property: String,
    pub target_types: Vec<String>,
    pub is_backward_property: bool,
    pub is_attribute: bool,
    pub source_property: Option<String>,
    pub pattern: PatternChange,
}

impl ObjectRuleForm {
    pub fn to_payload(&self) -> Value {
        let type_rules: Vec<Value> = self
            .target_types
            .iter()
            .map(|uri| json!({"type": "type", "typeUri": uri}))
            .collect();

        let mut rules = Map::new();
        match &self.pattern {
            PatternChange::Set(pattern) => {
                rules.insert(
                    "uriRule".to_string(),
                    json!({"type": RuleKind::Uri.as_str(), "pattern": pattern}),
                );
            }
            PatternChange::Clear => {
                rules.insert("uriRule".to_string(), Value::Null);
            }
            PatternChange::Keep => {}
        }
        rules.insert("typeRules".to_string(), Value::Array(type_rules));

        let mut payload = json!({
            "metadata": {"description": self.comment, "label": self.label},
            "mappingTarget": {
                "uri": self.target_property,
                "isBackwardProperty": self.is_backward_property,
                "valueType": {"nodeType": "UriValueType"},
                "isAttribute": self.is_attribute,
            },
            "sourcePath": self.source_property.clone().unwrap_or_default(),
        });

        if self.id.is_none() {
            rules.insert("propertyRules".to_string(), Value::Array(Vec::new()));
            payload["type"] = Value::String(RuleKind::Object.as_str().to_string());
        }
        payload["rules"] = Value::Object(rules);
        payload
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|err| ServiceError::Validation(format!("bad pattern {pattern}: {err}")))
}

/// Checks that `{path}` segments are balanced, non-empty and that the
/// pattern has no whitespace.
pub fn check_uri_pattern(pattern: &str) -> Result<ValidationResult> {
    if pattern.trim().is_empty() {
        return Ok(ValidationResult::invalid("URI pattern is empty", 0, 0));
    }
    if let Some(ws) = compile(r"\s")?.find(pattern) {
        return Ok(ValidationResult::invalid(
            "URI pattern must not contain whitespace",
            ws.start(),
            ws.end(),
        ));
    }

    let segment = compile(r"\{([^{}]*)\}")?;
    let mut last_end = 0;
    for captures in segment.captures_iter(pattern) {
        let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if let Some(stray) = stray_brace(&pattern[last_end..whole.start()]) {
            let at = last_end + stray;
            return Ok(ValidationResult::invalid("Unbalanced brace", at, at + 1));
        }
        if inner.as_str().is_empty() {
            return Ok(ValidationResult::invalid(
                "Empty path segment",
                whole.start(),
                whole.end(),
            ));
        }
        last_end = whole.end();
    }
    if let Some(stray) = stray_brace(&pattern[last_end..]) {
        let at = last_end + stray;
        return Ok(ValidationResult::invalid("Unbalanced brace", at, at + 1));
    }
    Ok(ValidationResult::ok())
}

fn stray_brace(text: &str) -> Option<usize> {
    text.find(['{', '}'])
}

/// Path expressions may only contain whitespace inside `[...]` filters or
/// quoted strings. An empty expression is valid.
pub fn check_path_expression(path: &str) -> ValidationResult {
    let mut depth = 0usize;
    let mut quoted = false;
    for (at, ch) in path.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '[' if !quoted => depth += 1,
            ']' if !quoted => {
                if depth == 0 {
                    return ValidationResult::invalid("Unbalanced ']'", at, at + 1);
                }
                depth -= 1;
            }
            c if c.is_whitespace() && !quoted && depth == 0 => {
                return ValidationResult::invalid(
                    "Whitespace is only allowed inside filters or quotes",
                    at,
                    at + c.len_utf8(),
                );
            }
            _ => {}
        }
    }
    if quoted {
        return ValidationResult::invalid("Unterminated quote", path.len(), path.len());
    }
    if depth > 0 {
        return ValidationResult::invalid("Unclosed '['", path.len(), path.len());
    }
    ValidationResult::ok()
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Id the rule service always assigns to the root of a transformation.
pub const ROOT_RULE_ID: &str = "root";

/// One node of the transformation tree, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MappingRule {
    Root(ContainerRule),
    Object(ContainerRule),
    Direct(ValueRule),
    Complex(ValueRule),
    Uri(UriRule),
    ComplexUri(UriRule),
}

/// Discriminant of [`MappingRule`] without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RuleKind {
    Root,
    Object,
    Direct,
    Complex,
    Uri,
    ComplexUri,
}

impl RuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::Root => "root",
            RuleKind::Object => "object",
            RuleKind::Direct => "direct",
            RuleKind::Complex => "complex",
            RuleKind::Uri => "uri",
            RuleKind::ComplexUri => "complexUri",
        }
    }

    /// Root and object rules own child property rules.
    pub fn is_container(self) -> bool {
        matches!(self, RuleKind::Root | RuleKind::Object)
    }

    pub fn is_value(self) -> bool {
        matches!(self, RuleKind::Direct | RuleKind::Complex)
    }

    pub fn is_uri(self) -> bool {
        matches!(self, RuleKind::Uri | RuleKind::ComplexUri)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "root" => Some(RuleKind::Root),
            "object" => Some(RuleKind::Object),
            "direct" => Some(RuleKind::Direct),
            "complex" => Some(RuleKind::Complex),
            "uri" => Some(RuleKind::Uri),
            "complexUri" => Some(RuleKind::ComplexUri),
            _ => None,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The value type of a target property, e.g. string, int or language tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValueType {
    /// Node type id, e.g. "UriValueType" or "StringValueType"
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MappingTarget {
    pub uri: String,
    #[serde(default)]
    pub value_type: ValueType,
    /// Only relevant when writing XML.
    #[serde(default)]
    pub is_attribute: bool,
    /// Reverses the generated property; only relevant for graph datasets.
    #[serde(default)]
    pub is_backward_property: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypeRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub type_uri: String,
}

/// Children of a root or object rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChildRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_rule: Option<Box<MappingRule>>,
    #[serde(default)]
    pub type_rules: Vec<TypeRule>,
    #[serde(default)]
    pub property_rules: Vec<MappingRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRule {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_target: Option<MappingTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default)]
    pub rules: ChildRules,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValueRule {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_target: Option<MappingTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_paths: Option<Vec<String>>,
    /// Operator tree of complex rules, kept opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UriRule {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<serde_json::Value>,
}

impl MappingRule {
    pub fn id(&self) -> &str {
        match self {
            MappingRule::Root(rule) | MappingRule::Object(rule) => &rule.id,
            MappingRule::Direct(rule) | MappingRule::Complex(rule) => &rule.id,
            MappingRule::Uri(rule) | MappingRule::ComplexUri(rule) => &rule.id,
        }
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        match self {
            MappingRule::Root(rule) | MappingRule::Object(rule) => rule.id = id,
            MappingRule::Direct(rule) | MappingRule::Complex(rule) => rule.id = id,
            MappingRule::Uri(rule) | MappingRule::ComplexUri(rule) => rule.id = id,
        }
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            MappingRule::Root(_) => RuleKind::Root,
            MappingRule::Object(_) => RuleKind::Object,
            MappingRule::Direct(_) => RuleKind::Direct,
            MappingRule::Complex(_) => RuleKind::Complex,
            MappingRule::Uri(_) => RuleKind::Uri,
            MappingRule::ComplexUri(_) => RuleKind::ComplexUri,
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind().is_container()
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            MappingRule::Root(rule) | MappingRule::Object(rule) => &rule.metadata,
            MappingRule::Direct(rule) | MappingRule::Complex(rule) => &rule.metadata,
            MappingRule::Uri(rule) | MappingRule::ComplexUri(rule) => &rule.metadata,
        }
    }

    pub fn mapping_target(&self) -> Option<&MappingTarget> {
        match self {
            MappingRule::Root(rule) | MappingRule::Object(rule) => rule.mapping_target.as_ref(),
            MappingRule::Direct(rule) | MappingRule::Complex(rule) => rule.mapping_target.as_ref(),
            MappingRule::Uri(_) | MappingRule::ComplexUri(_) => None,
        }
    }

    pub fn source_path(&self) -> Option<&str> {
        match self {
            MappingRule::Root(rule) | MappingRule::Object(rule) => rule.source_path.as_deref(),
            MappingRule::Direct(rule) | MappingRule::Complex(rule) => rule.source_path.as_deref(),
            MappingRule::Uri(_) | MappingRule::ComplexUri(_) => None,
        }
    }

    pub fn children(&self) -> Option<&ChildRules> {
        match self {
            MappingRule::Root(rule) | MappingRule::Object(rule) => Some(&rule.rules),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut ChildRules> {
        match self {
            MappingRule::Root(rule) | MappingRule::Object(rule) => Some(&mut rule.rules),
            _ => None,
        }
    }

    /// Id of the nested URI rule of a container, if any.
    pub fn uri_rule_id(&self) -> Option<&str> {
        self.children()
            .and_then(|children| children.uri_rule.as_deref())
            .map(MappingRule::id)
    }

    /// First target type of a container rule.
    pub fn type_uri(&self) -> Option<&str> {
        self.children()
            .and_then(|children| children.type_rules.first())
            .map(|rule| rule.type_uri.as_str())
    }

    /// Human readable label: metadata label, else target property, else id.
    pub fn display_label(&self) -> String {
        if let Some(label) = self
            .metadata()
            .label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
        {
            return label.to_string();
        }
        if let Some(target) = self.mapping_target().filter(|t| !t.uri.is_empty()) {
            return target.uri.clone();
        }
        self.id().to_string()
    }
}

use mapping_protocol::{MappingRule, RuleKind};
use serde::{Deserialize, Serialize};

/// One step from a container to a child rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// The nested URI rule of a container.
    UriRule,
    /// Index into the container's property rules.
    Property(usize),
}

/// Arena entry of one rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleNode {
    pub id: String,
    pub kind: RuleKind,

    /// Enclosing container; `None` only for the root
    pub parent: Option<String>,

    /// Id of the nested URI rule (containers only)
    pub uri_rule: Option<String>,

    /// Ids of the property rules in display order (containers only)
    pub property_rules: Vec<String>,

    /// Position of the rule inside the nested tree
    pub path: Vec<PathStep>,
}

/// Ancestor entry from the root down to (excluding) a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    pub id: String,
    /// First target type of the ancestor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_uri: Option<String>,
    /// Target property of the ancestor; absent for the root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_property: Option<String>,
}

impl Breadcrumb {
    pub fn of(rule: &MappingRule) -> Self {
        Self {
            id: rule.id().to_string(),
            type_uri: rule.type_uri().map(str::to_string),
            target_property: rule.mapping_target().map(|t| t.uri.clone()),
        }
    }
}

/// Result of [`RuleTree::find_rule`](crate::RuleTree::find_rule).
#[derive(Debug, Clone, PartialEq)]
pub struct RuleLookup<'a> {
    pub rule: &'a MappingRule,
    pub breadcrumbs: Vec<Breadcrumb>,
    /// False when the id was unknown and the whole tree was returned.
    pub found: bool,
}

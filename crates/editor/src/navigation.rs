use mapping_protocol::{MappingRule, RuleKind, ROOT_RULE_ID};
use mapping_tree::{RuleLookup, RuleTree};
use serde::Serialize;
use std::collections::HashMap;

/// One node of the navigation tree panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: String,
    pub kind: RuleKind,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_uri: Option<String>,
    pub highlighted: bool,
    pub expanded: bool,
    /// False renders a disabled leaf marker instead of an expand caret.
    pub has_children: bool,
    pub children: Vec<TreeNode>,
}

/// A visible line of the tree panel, children of collapsed nodes omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRow {
    pub depth: usize,
    pub id: String,
    pub kind: RuleKind,
    pub label: String,
    pub highlighted: bool,
    pub expanded: bool,
    pub has_children: bool,
}

/// One child row of the container in view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRow {
    pub id: String,
    pub kind: RuleKind,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_property: Option<String>,
    pub expanded: bool,
}

/// What a click on a rule does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Show this rule's container as the new top of the view.
    Navigate(String),
    /// Expand the row inside the container already in view.
    ExpandInPlace(String),
    Unknown,
}

fn is_highlighted(rule: &MappingRule, current: Option<&str>) -> bool {
    match current {
        Some(current) => rule.id() == current || rule.uri_rule_id() == Some(current),
        None => rule.kind() == RuleKind::Root,
    }
}

/// Builds the panel subtree of `rule`. The flag reports whether anything
/// below `rule` is highlighted.
fn build_node(
    rule: &MappingRule,
    current: Option<&str>,
    expansion: &HashMap<String, bool>,
    show_value_mappings: bool,
) -> (TreeNode, bool) {
    let eligible: Vec<&MappingRule> = rule
        .children()
        .map(|children| {
            children
                .uri_rule
                .as_deref()
                .into_iter()
                .chain(children.property_rules.iter())
                .filter(|child| show_value_mappings || child.kind() == RuleKind::Object)
                .collect()
        })
        .unwrap_or_default();

    let mut below_highlight = false;
    let children: Vec<TreeNode> = eligible
        .into_iter()
        .map(|child| {
            let (node, child_below) = build_node(child, current, expansion, show_value_mappings);
            below_highlight |= child_below || node.highlighted;
            node
        })
        .collect();

    let default_expanded = current == Some(rule.id()) || rule.kind() == RuleKind::Root;
    let expanded = expansion
        .get(rule.id())
        .copied()
        .unwrap_or(default_expanded)
        || below_highlight;

    let node = TreeNode {
        id: rule.id().to_string(),
        kind: rule.kind(),
        label: rule.display_label(),
        type_uri: rule.type_uri().map(str::to_string),
        highlighted: is_highlighted(rule, current),
        expanded,
        has_children: !children.is_empty(),
        children,
    };
    (node, below_highlight)
}

/// Pure tree-panel build over the whole tree.
pub fn build_panel(
    tree: &RuleTree,
    current: Option<&str>,
    expansion: &HashMap<String, bool>,
    show_value_mappings: bool,
) -> TreeNode {
    build_node(tree.root(), current, expansion, show_value_mappings).0
}

pub fn flatten(node: &TreeNode) -> Vec<FlatRow> {
    fn walk(node: &TreeNode, depth: usize, out: &mut Vec<FlatRow>) {
        out.push(FlatRow {
            depth,
            id: node.id.clone(),
            kind: node.kind,
            label: node.label.clone(),
            highlighted: node.highlighted,
            expanded: node.expanded,
            has_children: node.has_children,
        });
        if node.expanded {
            for child in &node.children {
                walk(child, depth + 1, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(node, 0, &mut out);
    out
}

/// Selected rule and per-row expansion state.
#[derive(Debug, Clone, Default)]
pub struct Navigation {
    current: Option<String>,
    expansion: HashMap<String, bool>,
    show_value_mappings: bool,
}

impl Navigation {
    pub fn new(current: Option<String>, show_value_mappings: bool) -> Self {
        Self {
            current,
            expansion: HashMap::new(),
            show_value_mappings,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_or_root(&self) -> &str {
        self.current.as_deref().unwrap_or(ROOT_RULE_ID)
    }

    pub fn set_current(&mut self, id: Option<String>) {
        self.current = id;
    }

    pub fn show_value_mappings(&self) -> bool {
        self.show_value_mappings
    }

    pub fn expansion(&self) -> &HashMap<String, bool> {
        &self.expansion
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expansion.get(id).copied().unwrap_or(false)
    }

    pub fn set_expanded(&mut self, id: impl Into<String>, expanded: bool) {
        self.expansion.insert(id.into(), expanded);
    }

    pub fn set_all_expanded<I, S>(&mut self, ids: I, expanded: bool)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            self.expansion.insert(id.into(), expanded);
        }
    }

    pub fn clear_expansion(&mut self) {
        self.expansion.clear();
    }

    pub fn panel(&self, tree: &RuleTree) -> TreeNode {
        build_panel(
            tree,
            self.current.as_deref(),
            &self.expansion,
            self.show_value_mappings,
        )
    }

    /// Container shown for the current rule, with its breadcrumbs.
    pub fn container<'t>(&self, tree: &'t RuleTree) -> RuleLookup<'t> {
        tree.find_rule(self.current_or_root(), true)
    }

    /// Property rules of the container in view. Row positions are the
    /// positions `reorder` takes; the URI rule is not part of the list.
    pub fn rows(&self, tree: &RuleTree) -> Vec<RuleRow> {
        let container = self.container(tree).rule;
        let Some(children) = container.children() else {
            return Vec::new();
        };
        children
            .property_rules
            .iter()
            .map(|rule| RuleRow {
                id: rule.id().to_string(),
                kind: rule.kind(),
                label: rule.display_label(),
                source_path: rule.source_path().map(str::to_string),
                target_property: rule.mapping_target().map(|t| t.uri.clone()),
                expanded: self.is_expanded(rule.id()),
            })
            .collect()
    }

    /// Classifies a click on `id`: containers navigate, value and URI rules
    /// of the container in view expand in place, others navigate.
    pub fn select(&self, tree: &RuleTree, id: &str) -> Selection {
        let Some(node) = tree.node(id) else {
            return Selection::Unknown;
        };
        if node.kind.is_container() {
            return Selection::Navigate(id.to_string());
        }
        let in_view = self.container(tree).rule.id();
        if node.parent.as_deref() == Some(in_view) {
            Selection::ExpandInPlace(id.to_string())
        } else {
            Selection::Navigate(id.to_string())
        }
    }

    /// Row to open on the first load after navigating to a non-container
    /// rule: the owning object for a URI rule id, else the rule itself.
    pub fn row_to_open(&self, tree: &RuleTree) -> Option<String> {
        let current = self.current.as_deref()?;
        let container = self.container(tree).rule;
        if container.id() == current {
            return None;
        }
        if container.uri_rule_id() == Some(current) {
            Some(container.id().to_string())
        } else {
            Some(current.to_string())
        }
    }
}

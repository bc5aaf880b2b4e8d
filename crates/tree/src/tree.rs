use crate::error::{Result, TreeError};
use crate::patch::patch_rule;
use crate::types::{Breadcrumb, PathStep, RuleLookup, RuleNode};
use mapping_protocol::{MappingRule, RuleKind, ROOT_RULE_ID};
use serde_json::Value;
use std::collections::HashMap;

/// Rule tree plus an id index over all of its rules.
#[derive(Debug, Clone)]
pub struct RuleTree {
    root: MappingRule,
    index: HashMap<String, RuleNode>,
}

impl RuleTree {
    /// Indexes `root`, rejecting trees that break the strict-tree shape.
    pub fn from_root(root: MappingRule) -> Result<Self> {
        let index = build_index(&root)?;
        log::debug!("Indexed rule tree with {} rules", index.len());
        Ok(Self { root, index })
    }

    pub fn root(&self) -> &MappingRule {
        &self.root
    }

    pub fn into_root(self) -> MappingRule {
        self.root
    }

    pub fn root_id(&self) -> &str {
        self.root.id()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn node(&self, id: &str) -> Option<&RuleNode> {
        self.index.get(id)
    }

    pub fn get(&self, id: &str) -> Option<&MappingRule> {
        let node = self.index.get(id)?;
        rule_at(&self.root, &node.path)
    }

    pub fn parent_id(&self, id: &str) -> Option<&str> {
        self.index.get(id)?.parent.as_deref()
    }

    /// Property rule ids of a container in display order.
    pub fn property_rule_ids(&self, id: &str) -> &[String] {
        self.index
            .get(id)
            .map(|node| node.property_rules.as_slice())
            .unwrap_or(&[])
    }

    /// Ancestors of `id`, root first, excluding the rule itself.
    pub fn ancestors(&self, id: &str) -> Vec<&RuleNode> {
        let mut chain = Vec::new();
        let mut current = self.parent_id(id);
        while let Some(parent) = current {
            let Some(node) = self.index.get(parent) else {
                break;
            };
            chain.push(node);
            current = node.parent.as_deref();
        }
        chain.reverse();
        chain
    }

    pub fn breadcrumbs(&self, id: &str) -> Vec<Breadcrumb> {
        self.ancestors(id)
            .into_iter()
            .filter_map(|node| self.get(&node.id))
            .map(Breadcrumb::of)
            .collect()
    }

    /// The rule itself when it is a container, else its enclosing container.
    pub fn enclosing_container(&self, id: &str) -> Option<&str> {
        let node = self.index.get(id)?;
        if node.kind.is_container() {
            Some(node.id.as_str())
        } else {
            node.parent.as_deref()
        }
    }

    /// Depth-first rule lookup.
    ///
    /// A container matches on its own id and on the id of its URI rule. With
    /// `is_object_mapping` a matching value rule resolves to its enclosing
    /// container. Unknown ids return the whole tree.
    pub fn find_rule(&self, id: &str, is_object_mapping: bool) -> RuleLookup<'_> {
        let Some(mut node) = self.index.get(id) else {
            return RuleLookup {
                rule: &self.root,
                breadcrumbs: Vec::new(),
                found: false,
            };
        };

        let resolve_to_parent =
            node.kind.is_uri() || (is_object_mapping && node.kind.is_value());
        if resolve_to_parent {
            if let Some(parent) = node.parent.as_deref().and_then(|p| self.index.get(p)) {
                node = parent;
            }
        }

        match rule_at(&self.root, &node.path) {
            Some(rule) => RuleLookup {
                rule,
                breadcrumbs: self.breadcrumbs(&node.id),
                found: true,
            },
            None => RuleLookup {
                rule: &self.root,
                breadcrumbs: Vec::new(),
                found: false,
            },
        }
    }

    /// All ids of the subtree under `id`, the rule itself first.
    pub fn subtree_ids(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.index.get(current) else {
                continue;
            };
            out.push(node.id.clone());
            for child in node.property_rules.iter().rev() {
                stack.push(child);
            }
            if let Some(uri) = node.uri_rule.as_deref() {
                stack.push(uri);
            }
        }
        out
    }

    /// Merge-patches the rule `id`; the tree is unchanged on error.
    pub fn update_rule(&mut self, id: &str, patch: &Value) -> Result<()> {
        let current = self
            .get(id)
            .ok_or_else(|| TreeError::RuleNotFound(id.to_string()))?;
        let patched = patch_rule(current, patch)?;
        self.replace_rule(id, patched)
    }

    /// Swaps the rule `id` (and its subtree) for `rule`, keeping the id.
    pub fn replace_rule(&mut self, id: &str, mut rule: MappingRule) -> Result<()> {
        let path = self.path_of(id)?;
        rule.set_id(id);
        let mut root = self.root.clone();
        let target = rule_at_mut(&mut root, &path)
            .ok_or_else(|| TreeError::RuleNotFound(id.to_string()))?;
        *target = rule;
        self.replace_root(root)
    }

    /// Inserts `rule` into the property rules of `parent_id`, after
    /// `after_id` when given, else at the end.
    pub fn append_rule(
        &mut self,
        parent_id: &str,
        rule: MappingRule,
        after_id: Option<&str>,
    ) -> Result<()> {
        let parent = self
            .index
            .get(parent_id)
            .ok_or_else(|| TreeError::RuleNotFound(parent_id.to_string()))?;
        if !parent.kind.is_container() {
            return Err(TreeError::NotAContainer(parent_id.to_string()));
        }
        let position = match after_id {
            Some(after) => {
                parent
                    .property_rules
                    .iter()
                    .position(|child| child == after)
                    .ok_or_else(|| TreeError::RuleNotFound(after.to_string()))?
                    + 1
            }
            None => parent.property_rules.len(),
        };

        let path = parent.path.clone();
        let mut root = self.root.clone();
        let children = rule_at_mut(&mut root, &path)
            .and_then(MappingRule::children_mut)
            .ok_or_else(|| TreeError::NotAContainer(parent_id.to_string()))?;
        children.property_rules.insert(position, rule);
        self.replace_root(root)
    }

    /// Removes the rule `id` and its subtree.
    pub fn remove_rule(&mut self, id: &str) -> Result<MappingRule> {
        let path = self.path_of(id)?;
        let Some((last, parent_path)) = path.split_last() else {
            return Err(TreeError::CannotRemoveRoot);
        };

        let mut root = self.root.clone();
        let children = rule_at_mut(&mut root, parent_path)
            .and_then(MappingRule::children_mut)
            .ok_or_else(|| TreeError::RuleNotFound(id.to_string()))?;
        let removed = match *last {
            PathStep::UriRule => children.uri_rule.take().map(|rule| *rule),
            PathStep::Property(index) if index < children.property_rules.len() => {
                Some(children.property_rules.remove(index))
            }
            PathStep::Property(_) => None,
        }
        .ok_or_else(|| TreeError::RuleNotFound(id.to_string()))?;

        self.replace_root(root)?;
        Ok(removed)
    }

    /// Reorders the property rules of `parent_id`; `ordered` must be a
    /// permutation of the current child ids.
    pub fn reorder_children(&mut self, parent_id: &str, ordered: &[String]) -> Result<()> {
        let parent = self
            .index
            .get(parent_id)
            .ok_or_else(|| TreeError::RuleNotFound(parent_id.to_string()))?;
        if !parent.kind.is_container() {
            return Err(TreeError::NotAContainer(parent_id.to_string()));
        }
        let invalid = |reason: &str| TreeError::InvalidOrder {
            parent: parent_id.to_string(),
            reason: reason.to_string(),
        };
        if ordered.len() != parent.property_rules.len() {
            return Err(invalid("child count differs"));
        }

        let path = parent.path.clone();
        let mut root = self.root.clone();
        let children = rule_at_mut(&mut root, &path)
            .and_then(MappingRule::children_mut)
            .ok_or_else(|| TreeError::NotAContainer(parent_id.to_string()))?;

        let mut by_id: HashMap<String, MappingRule> = children
            .property_rules
            .drain(..)
            .map(|rule| (rule.id().to_string(), rule))
            .collect();
        let mut reordered = Vec::with_capacity(ordered.len());
        for id in ordered {
            let rule = by_id
                .remove(id)
                .ok_or_else(|| invalid(&format!("{id} is not a child or is repeated")))?;
            reordered.push(rule);
        }
        children.property_rules = reordered;
        self.replace_root(root)
    }

    fn path_of(&self, id: &str) -> Result<Vec<PathStep>> {
        self.index
            .get(id)
            .map(|node| node.path.clone())
            .ok_or_else(|| TreeError::RuleNotFound(id.to_string()))
    }

    fn replace_root(&mut self, root: MappingRule) -> Result<()> {
        self.index = build_index(&root)?;
        self.root = root;
        Ok(())
    }
}

/// Gives every rule of the subtree (and its type rules) a fresh id.
pub fn reassign_ids(rule: &mut MappingRule, next_id: &mut impl FnMut() -> String) {
    rule.set_id(next_id());
    if let Some(children) = rule.children_mut() {
        if let Some(uri) = children.uri_rule.as_deref_mut() {
            reassign_ids(uri, next_id);
        }
        for type_rule in &mut children.type_rules {
            if type_rule.id.is_some() {
                type_rule.id = Some(next_id());
            }
        }
        for child in &mut children.property_rules {
            reassign_ids(child, next_id);
        }
    }
}

fn rule_at<'a>(root: &'a MappingRule, path: &[PathStep]) -> Option<&'a MappingRule> {
    let mut current = root;
    for step in path {
        let children = current.children()?;
        current = match *step {
            PathStep::UriRule => children.uri_rule.as_deref()?,
            PathStep::Property(index) => children.property_rules.get(index)?,
        };
    }
    Some(current)
}

fn rule_at_mut<'a>(root: &'a mut MappingRule, path: &[PathStep]) -> Option<&'a mut MappingRule> {
    let mut current = root;
    for step in path {
        let children = current.children_mut()?;
        current = match *step {
            PathStep::UriRule => children.uri_rule.as_deref_mut()?,
            PathStep::Property(index) => children.property_rules.get_mut(index)?,
        };
    }
    Some(current)
}

fn build_index(root: &MappingRule) -> Result<HashMap<String, RuleNode>> {
    if root.kind() != RuleKind::Root {
        return Err(TreeError::InvalidRoot(format!(
            "expected a root rule, got {}",
            root.kind()
        )));
    }
    if root.id() != ROOT_RULE_ID {
        return Err(TreeError::InvalidRoot(format!(
            "root id must be {ROOT_RULE_ID}, got {}",
            root.id()
        )));
    }
    let mut index = HashMap::new();
    index_rule(root, None, Vec::new(), &mut index)?;
    Ok(index)
}

fn index_rule(
    rule: &MappingRule,
    parent: Option<&str>,
    path: Vec<PathStep>,
    index: &mut HashMap<String, RuleNode>,
) -> Result<()> {
    if rule.id().is_empty() {
        return Err(TreeError::MissingId {
            parent: parent.unwrap_or("<none>").to_string(),
        });
    }

    let mut node = RuleNode {
        id: rule.id().to_string(),
        kind: rule.kind(),
        parent: parent.map(str::to_string),
        uri_rule: None,
        property_rules: Vec::new(),
        path,
    };

    if let Some(children) = rule.children() {
        if let Some(uri) = children.uri_rule.as_deref() {
            if !uri.kind().is_uri() {
                return Err(misplaced(uri));
            }
            node.uri_rule = Some(uri.id().to_string());
            let mut child_path = node.path.clone();
            child_path.push(PathStep::UriRule);
            index_rule(uri, Some(rule.id()), child_path, index)?;
        }
        for (position, child) in children.property_rules.iter().enumerate() {
            if child.kind() == RuleKind::Root || child.kind().is_uri() {
                return Err(misplaced(child));
            }
            node.property_rules.push(child.id().to_string());
            let mut child_path = node.path.clone();
            child_path.push(PathStep::Property(position));
            index_rule(child, Some(rule.id()), child_path, index)?;
        }
    }

    let id = node.id.clone();
    if index.insert(id.clone(), node).is_some() {
        return Err(TreeError::DuplicateId(id));
    }
    Ok(())
}

fn misplaced(rule: &MappingRule) -> TreeError {
    TreeError::MisplacedRule {
        id: rule.id().to_string(),
        kind: rule.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_tree() -> RuleTree {
        let root: MappingRule = serde_json::from_value(json!({
            "type": "root",
            "id": "root",
            "rules": {
                "uriRule": {"type": "uri", "id": "rootUri", "pattern": "ex:{id}"},
                "typeRules": [{"typeUri": "ex:Person"}],
                "propertyRules": [
                    {"type": "direct", "id": "city", "sourcePath": "city",
                     "mappingTarget": {"uri": "ex:city"}},
                    {"type": "object", "id": "address",
                     "mappingTarget": {"uri": "ex:address"},
                     "rules": {
                        "uriRule": {"type": "uri", "id": "addressUri"},
                        "typeRules": [{"typeUri": "ex:Address"}],
                        "propertyRules": [
                            {"type": "direct", "id": "street", "sourcePath": "street"},
                            {"type": "object", "id": "geo", "rules": {"propertyRules": [
                                {"type": "complex", "id": "lat"}
                            ]}}
                        ]
                     }},
                    {"type": "direct", "id": "name", "sourcePath": "name"}
                ]
            }
        }))
        .unwrap();
        RuleTree::from_root(root).unwrap()
    }

    #[test]
    fn every_id_resolves_to_itself_or_its_uri_owner() {
        let tree = sample_tree();
        let ids: Vec<String> = tree.ids().map(str::to_string).collect();
        assert_eq!(ids.len(), 9);
        for id in ids {
            let lookup = tree.find_rule(&id, false);
            assert!(lookup.found);
            assert!(
                lookup.rule.id() == id || lookup.rule.uri_rule_id() == Some(id.as_str()),
                "lookup of {id} returned {}",
                lookup.rule.id()
            );
        }
    }

    #[test]
    fn unknown_id_returns_whole_tree() {
        let tree = sample_tree();
        let lookup = tree.find_rule("missing", true);
        assert!(!lookup.found);
        assert_eq!(lookup.rule, tree.root());
        assert!(lookup.breadcrumbs.is_empty());
    }

    #[test]
    fn object_mapping_lookup_resolves_value_to_enclosing_container() {
        let tree = sample_tree();
        let lookup = tree.find_rule("street", true);
        assert_eq!(lookup.rule.id(), "address");
        assert_eq!(
            lookup.breadcrumbs,
            vec![Breadcrumb {
                id: "root".to_string(),
                type_uri: Some("ex:Person".to_string()),
                target_property: None,
            }]
        );

        let lookup = tree.find_rule("lat", true);
        assert_eq!(lookup.rule.id(), "geo");
        let crumbs: Vec<&str> = lookup.breadcrumbs.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(crumbs, vec!["root", "address"]);
        assert_eq!(lookup.breadcrumbs[1].target_property.as_deref(), Some("ex:address"));

        assert_eq!(tree.find_rule("street", false).rule.id(), "street");
    }

    #[test]
    fn uri_rule_id_resolves_to_owner() {
        let tree = sample_tree();
        assert_eq!(tree.find_rule("addressUri", false).rule.id(), "address");
        assert_eq!(tree.find_rule("rootUri", true).rule.id(), "root");
    }

    #[test]
    fn rejects_duplicate_ids_and_bad_roots() {
        let duplicate: MappingRule = serde_json::from_value(json!({
            "type": "root", "id": "root",
            "rules": {"propertyRules": [
                {"type": "direct", "id": "x"},
                {"type": "object", "id": "o", "rules": {"propertyRules": [
                    {"type": "direct", "id": "x"}
                ]}}
            ]}
        }))
        .unwrap();
        assert!(matches!(
            RuleTree::from_root(duplicate),
            Err(TreeError::DuplicateId(id)) if id == "x"
        ));

        let object_root: MappingRule =
            serde_json::from_value(json!({"type": "object", "id": "root"})).unwrap();
        assert!(matches!(
            RuleTree::from_root(object_root),
            Err(TreeError::InvalidRoot(_))
        ));
    }

    #[test]
    fn update_merges_and_reindexes() {
        let mut tree = sample_tree();
        tree.update_rule("city", &json!({"metadata": {"label": "Town"}}))
            .unwrap();
        let city = tree.get("city").unwrap();
        assert_eq!(city.metadata().label.as_deref(), Some("Town"));
        assert_eq!(city.source_path(), Some("city"));

        let err = tree
            .update_rule("city", &json!({"type": "object", "rules": {"propertyRules": [
                {"type": "direct", "id": "name"}
            ]}}))
            .unwrap_err();
        assert!(matches!(err, TreeError::DuplicateId(_)));
        assert_eq!(tree.get("city").unwrap().kind(), RuleKind::Direct);
    }

    #[test]
    fn append_after_sibling_and_remove_subtree() {
        let mut tree = sample_tree();
        let rule: MappingRule =
            serde_json::from_value(json!({"type": "direct", "id": "zip"})).unwrap();
        tree.append_rule("address", rule, Some("street")).unwrap();
        assert_eq!(tree.property_rule_ids("address"), ["street", "zip", "geo"]);
        assert_eq!(tree.parent_id("zip"), Some("address"));

        let removed = tree.remove_rule("address").unwrap();
        assert_eq!(removed.id(), "address");
        assert!(!tree.contains("lat"));
        assert!(!tree.contains("addressUri"));
        assert_eq!(tree.property_rule_ids("root"), ["city", "name"]);
        assert!(matches!(tree.remove_rule("root"), Err(TreeError::CannotRemoveRoot)));
    }

    #[test]
    fn reorder_requires_a_permutation() {
        let mut tree = sample_tree();
        let order: Vec<String> = ["name", "city", "address"].map(String::from).to_vec();
        tree.reorder_children("root", &order).unwrap();
        assert_eq!(tree.property_rule_ids("root"), order.as_slice());
        assert_eq!(tree.find_rule("lat", true).rule.id(), "geo");

        let bad: Vec<String> = ["name", "name", "city"].map(String::from).to_vec();
        assert!(matches!(
            tree.reorder_children("root", &bad),
            Err(TreeError::InvalidOrder { .. })
        ));
        assert_eq!(tree.property_rule_ids("root"), order.as_slice());
    }

    #[test]
    fn subtree_ids_and_reassignment() {
        let tree = sample_tree();
        assert_eq!(
            tree.subtree_ids("address"),
            vec!["address", "addressUri", "street", "geo", "lat"]
        );

        let mut copy = tree.get("address").unwrap().clone();
        let mut counter = 0;
        reassign_ids(&mut copy, &mut || {
            counter += 1;
            format!("copy{counter}")
        });
        assert_eq!(copy.id(), "copy1");
        assert_eq!(copy.uri_rule_id(), Some("copy2"));
    }
}

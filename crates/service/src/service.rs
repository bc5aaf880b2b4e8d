use crate::error::Result;
use async_trait::async_trait;
use mapping_protocol::{
    CopyRuleRequest, CopyRuleResponse, GenerateRulesRequest, MappingRule, SourcePathInfo,
    SuggestionRequest, TermInfo, ValidationResult, VocabularyInfos, VocabularyMatchResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Project and transformation task the editor works on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRef {
    pub project: String,
    pub task: String,
}

impl TaskRef {
    pub fn new(project: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            task: task.into(),
        }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.task)
    }
}

/// Operations of the backend rule service.
///
/// Every structural call is followed by a full tree fetch on the caller side;
/// implementations never patch a client-held tree.
#[async_trait]
pub trait RuleService: Send + Sync {
    fn task(&self) -> &TaskRef;

    /// Whole rule tree of the task.
    async fn fetch_tree(&self) -> Result<MappingRule>;

    /// Merge-patch update of one rule.
    async fn update_rule(&self, rule_id: &str, patch: &Value) -> Result<()>;

    /// Appends `payload` to the property rules of `parent_id`, returning the
    /// rule as stored.
    async fn append_rule(&self, parent_id: &str, payload: &Value) -> Result<MappingRule>;

    async fn delete_rule(&self, rule_id: &str) -> Result<()>;

    /// New order of the property rules of `parent_id`.
    async fn reorder_rules(&self, parent_id: &str, ordered: &[String]) -> Result<()>;

    /// Copies a rule (possibly of another task) into `append_to`.
    async fn copy_rule(
        &self,
        append_to: &str,
        request: &CopyRuleRequest,
    ) -> Result<CopyRuleResponse>;

    async fn vocabulary_infos(&self) -> Result<VocabularyInfos>;

    /// Vocabulary-class matching; `None` when the matcher is unavailable.
    async fn match_vocabulary(
        &self,
        request: &SuggestionRequest,
    ) -> Result<Option<VocabularyMatchResponse>>;

    /// Source value paths below `rule_id` with their usage info.
    async fn value_source_paths(&self, rule_id: &str) -> Result<Vec<SourcePathInfo>>;

    /// Rule payloads for accepted correspondences; nothing is stored yet.
    async fn generate_rules(
        &self,
        parent_id: &str,
        request: &GenerateRulesRequest,
    ) -> Result<Vec<Value>>;

    async fn prefixes(&self) -> Result<BTreeMap<String, String>>;

    /// Example values per source path of `rule_id`.
    async fn example_values(&self, rule_id: &str) -> Result<BTreeMap<String, Vec<String>>>;

    async fn term_info(&self, uri: &str) -> Result<TermInfo>;

    async fn validate_path(&self, path_expression: &str) -> Result<ValidationResult>;

    async fn validate_uri_pattern(&self, pattern: &str) -> Result<ValidationResult>;
}

use crate::error::{Result, ServiceError};
use crate::payload::{check_path_expression, check_uri_pattern};
use crate::service::{RuleService, TaskRef};
use async_trait::async_trait;
use mapping_protocol::{
    CandidateKind, CopyRuleRequest, CopyRuleResponse, GenerateRulesRequest, GenericInfo,
    MappingRule, SourcePathInfo, SuggestionRequest, TermInfo, ValidationResult, VocabularyInfo,
    VocabularyInfos, VocabularyMatchResponse,
};
use mapping_tree::{merge_patch, reassign_ids, RuleTree};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Service operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchTree,
    UpdateRule,
    AppendRule,
    DeleteRule,
    ReorderRules,
    CopyRule,
    VocabularyInfos,
    MatchVocabulary,
    ValueSourcePaths,
    GenerateRules,
}

/// On-disk form of an in-memory task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub project: String,
    pub task: String,
    pub tree: MappingRule,
    #[serde(default)]
    pub vocabularies: Vec<VocabularyInfo>,
    /// `None` means the matcher is not installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<VocabularyMatchResponse>,
    #[serde(default)]
    pub source_paths: Vec<SourcePathInfo>,
    #[serde(default)]
    pub prefixes: BTreeMap<String, String>,
    #[serde(default)]
    pub example_values: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub terms: BTreeMap<String, GenericInfo>,
}

impl Fixture {
    pub fn new(task: TaskRef, tree: MappingRule) -> Self {
        Self {
            project: task.project,
            task: task.task,
            tree,
            vocabularies: Vec::new(),
            matches: None,
            source_paths: Vec::new(),
            prefixes: BTreeMap::new(),
            example_values: BTreeMap::new(),
            terms: BTreeMap::new(),
        }
    }
}

struct MemoryState {
    fixture: Fixture,
    tree: RuleTree,
    next_id: u64,
    failures: HashMap<Operation, usize>,
    fail_targets: Vec<String>,
    foreign: HashMap<TaskRef, RuleTree>,
    copy_requests: Vec<(String, CopyRuleRequest)>,
    suggestion_requests: Vec<SuggestionRequest>,
    calls: Vec<Operation>,
}

impl MemoryState {
    fn fresh_id(&mut self, hint: &str) -> String {
        loop {
            self.next_id += 1;
            let candidate = format!("{hint}{}", self.next_id);
            if !self.tree.contains(&candidate) {
                return candidate;
            }
        }
    }

    fn enter(&mut self, op: Operation) -> Result<()> {
        self.calls.push(op);
        match self.failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(ServiceError::service(
                    500,
                    "Internal Server Error",
                    format!("injected failure of {op:?}"),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Fills in ids of rules (and nested URI rules) that have none.
    fn assign_missing_ids(&mut self, value: &mut Value) {
        let Some(object) = value.as_object_mut() else {
            return;
        };
        let missing = match object.get("id") {
            Some(Value::String(id)) => id.is_empty(),
            _ => true,
        };
        if missing {
            let hint = object
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("rule")
                .to_string();
            object.insert("id".to_string(), Value::String(self.fresh_id(&hint)));
        }
        if let Some(rules) = object.get_mut("rules").and_then(Value::as_object_mut) {
            if let Some(uri_rule) = rules.get_mut("uriRule").filter(|v| v.is_object()) {
                self.assign_missing_ids(uri_rule);
            }
            if let Some(children) = rules.get_mut("propertyRules").and_then(Value::as_array_mut) {
                for child in children {
                    self.assign_missing_ids(child);
                }
            }
        }
    }
}

/// Rule service holding one task in memory.
///
/// With a fixture path every successful mutation is written back to the file.
pub struct InMemoryRuleService {
    task: TaskRef,
    state: Mutex<MemoryState>,
    fixture_path: Option<PathBuf>,
    append_delay: Option<Duration>,
    appends_in_flight: AtomicUsize,
    max_appends_in_flight: AtomicUsize,
}

impl InMemoryRuleService {
    pub fn new(task: TaskRef, tree: MappingRule) -> Result<Self> {
        Self::from_fixture(Fixture::new(task, tree))
    }

    pub fn from_fixture(fixture: Fixture) -> Result<Self> {
        let tree = RuleTree::from_root(fixture.tree.clone())?;
        let task = TaskRef::new(fixture.project.clone(), fixture.task.clone());
        Ok(Self {
            task,
            state: Mutex::new(MemoryState {
                fixture,
                tree,
                next_id: 0,
                failures: HashMap::new(),
                fail_targets: Vec::new(),
                foreign: HashMap::new(),
                copy_requests: Vec::new(),
                suggestion_requests: Vec::new(),
                calls: Vec::new(),
            }),
            fixture_path: None,
            append_delay: None,
            appends_in_flight: AtomicUsize::new(0),
            max_appends_in_flight: AtomicUsize::new(0),
        })
    }

    /// Loads a fixture file; mutations are persisted back to it.
    pub async fn open(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let fixture: Fixture = serde_json::from_slice(&bytes)?;
        log::debug!("Loaded fixture {} for {}/{}", path.display(), fixture.project, fixture.task);
        let mut service = Self::from_fixture(fixture)?;
        service.fixture_path = Some(path.to_path_buf());
        Ok(service)
    }

    /// Delays every append, so concurrent appends overlap.
    pub fn with_append_delay(mut self, delay: Duration) -> Self {
        self.append_delay = Some(delay);
        self
    }

    /// The next `count` calls of `op` fail with a 500 response.
    pub async fn fail_next(&self, op: Operation, count: usize) {
        self.state.lock().await.failures.insert(op, count);
    }

    /// Appends whose target property is `uri` fail with a 400 response.
    pub async fn fail_appends_targeting(&self, uri: impl Into<String>) {
        self.state.lock().await.fail_targets.push(uri.into());
    }

    /// Registers the tree of another task as a copy source.
    pub async fn add_source_task(&self, task: TaskRef, tree: MappingRule) -> Result<()> {
        let tree = RuleTree::from_root(tree)?;
        self.state.lock().await.foreign.insert(task, tree);
        Ok(())
    }

    pub async fn set_matches(&self, matches: Option<VocabularyMatchResponse>) {
        self.state.lock().await.fixture.matches = matches;
    }

    pub async fn set_vocabularies(&self, vocabularies: Vec<VocabularyInfo>) {
        self.state.lock().await.fixture.vocabularies = vocabularies;
    }

    pub async fn set_source_paths(&self, paths: Vec<SourcePathInfo>) {
        self.state.lock().await.fixture.source_paths = paths;
    }

    pub async fn set_term(&self, uri: impl Into<String>, info: GenericInfo) {
        self.state.lock().await.fixture.terms.insert(uri.into(), info);
    }

    pub async fn tree(&self) -> RuleTree {
        self.state.lock().await.tree.clone()
    }

    pub async fn copy_requests(&self) -> Vec<(String, CopyRuleRequest)> {
        self.state.lock().await.copy_requests.clone()
    }

    pub async fn suggestion_requests(&self) -> Vec<SuggestionRequest> {
        self.state.lock().await.suggestion_requests.clone()
    }

    /// Operations called so far, in call order.
    pub async fn calls(&self) -> Vec<Operation> {
        self.state.lock().await.calls.clone()
    }

    pub fn max_appends_in_flight(&self) -> usize {
        self.max_appends_in_flight.load(Ordering::SeqCst)
    }

    async fn persist(&self, state: &mut MemoryState) -> Result<()> {
        state.fixture.tree = state.tree.root().clone();
        let Some(path) = &self.fixture_path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&state.fixture)?;
        tokio::fs::write(path, bytes).await?;
        log::debug!("Saved fixture {}", path.display());
        Ok(())
    }

    async fn append_inner(&self, parent_id: &str, payload: &Value) -> Result<MappingRule> {
        let mut state = self.state.lock().await;
        state.enter(Operation::AppendRule)?;

        let target = payload
            .pointer("/mappingTarget/uri")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if state.fail_targets.iter().any(|uri| uri == target) {
            return Err(ServiceError::service(
                400,
                "Bad Request",
                format!("Cannot map to {target}"),
            ));
        }

        let mut value = payload.clone();
        state.assign_missing_ids(&mut value);
        let rule: MappingRule = serde_json::from_value(value)?;
        state.tree.append_rule(parent_id, rule.clone(), None)?;
        self.persist(&mut state).await?;
        log::info!("Appended rule {} to {parent_id}", rule.id());
        Ok(rule)
    }
}

fn generated_payload(source_path: &str, target: &str, kind: CandidateKind) -> Value {
    match kind {
        CandidateKind::Value => json!({
            "type": "direct",
            "sourcePath": source_path,
            "mappingTarget": {
                "uri": target,
                "valueType": {"nodeType": "StringValueType"},
            },
        }),
        CandidateKind::Object => json!({
            "type": "object",
            "sourcePath": source_path,
            "mappingTarget": {
                "uri": target,
                "valueType": {"nodeType": "UriValueType"},
            },
            "rules": {"typeRules": [], "propertyRules": []},
        }),
    }
}

#[async_trait]
impl RuleService for InMemoryRuleService {
    fn task(&self) -> &TaskRef {
        &self.task
    }

    async fn fetch_tree(&self) -> Result<MappingRule> {
        let mut state = self.state.lock().await;
        state.enter(Operation::FetchTree)?;
        Ok(state.tree.root().clone())
    }

    async fn update_rule(&self, rule_id: &str, patch: &Value) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(Operation::UpdateRule)?;
        let current = state
            .tree
            .get(rule_id)
            .ok_or_else(|| ServiceError::service(404, "Not Found", format!("Rule {rule_id}")))?;
        let mut value = serde_json::to_value(current)?;
        merge_patch(&mut value, patch);
        state.assign_missing_ids(&mut value);
        let rule: MappingRule = serde_json::from_value(value)?;
        state.tree.replace_rule(rule_id, rule)?;
        self.persist(&mut state).await?;
        log::info!("Updated rule {rule_id}");
        Ok(())
    }

    async fn append_rule(&self, parent_id: &str, payload: &Value) -> Result<MappingRule> {
        let now = self.appends_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_appends_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.append_delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.append_inner(parent_id, payload).await;
        self.appends_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn delete_rule(&self, rule_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(Operation::DeleteRule)?;
        state.tree.remove_rule(rule_id)?;
        self.persist(&mut state).await?;
        log::info!("Deleted rule {rule_id}");
        Ok(())
    }

    async fn reorder_rules(&self, parent_id: &str, ordered: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(Operation::ReorderRules)?;
        state.tree.reorder_children(parent_id, ordered)?;
        self.persist(&mut state).await
    }

    async fn copy_rule(
        &self,
        append_to: &str,
        request: &CopyRuleRequest,
    ) -> Result<CopyRuleResponse> {
        let mut state = self.state.lock().await;
        state
            .copy_requests
            .push((append_to.to_string(), request.clone()));
        state.enter(Operation::CopyRule)?;

        let source_task = TaskRef::new(request.source_project.clone(), request.source_task.clone());
        let source = if source_task == self.task {
            state.tree.get(&request.source_rule).cloned()
        } else {
            state
                .foreign
                .get(&source_task)
                .and_then(|tree| tree.get(&request.source_rule))
                .cloned()
        };
        let mut copy = source.ok_or_else(|| {
            ServiceError::service(
                404,
                "Not Found",
                format!("Rule {} in {source_task}", request.source_rule),
            )
        })?;

        let hint = copy.kind().as_str().to_string();
        reassign_ids(&mut copy, &mut || state.fresh_id(&hint));

        let new_id = copy.id().to_string();
        state
            .tree
            .append_rule(append_to, copy, request.after_rule_id.as_deref())?;
        self.persist(&mut state).await?;
        log::info!("Copied rule {} into {append_to} as {new_id}", request.source_rule);
        Ok(CopyRuleResponse { id: new_id })
    }

    async fn vocabulary_infos(&self) -> Result<VocabularyInfos> {
        let mut state = self.state.lock().await;
        state.enter(Operation::VocabularyInfos)?;
        Ok(VocabularyInfos {
            vocabularies: state.fixture.vocabularies.clone(),
        })
    }

    async fn match_vocabulary(
        &self,
        request: &SuggestionRequest,
    ) -> Result<Option<VocabularyMatchResponse>> {
        let mut state = self.state.lock().await;
        state.suggestion_requests.push(request.clone());
        state.enter(Operation::MatchVocabulary)?;
        Ok(state.fixture.matches.clone())
    }

    async fn value_source_paths(&self, rule_id: &str) -> Result<Vec<SourcePathInfo>> {
        let mut state = self.state.lock().await;
        state.enter(Operation::ValueSourcePaths)?;
        if !state.tree.contains(rule_id) {
            return Err(ServiceError::service(404, "Not Found", format!("Rule {rule_id}")));
        }
        Ok(state.fixture.source_paths.clone())
    }

    async fn generate_rules(
        &self,
        parent_id: &str,
        request: &GenerateRulesRequest,
    ) -> Result<Vec<Value>> {
        let mut state = self.state.lock().await;
        state.enter(Operation::GenerateRules)?;
        if !state.tree.contains(parent_id) {
            return Err(ServiceError::service(404, "Not Found", format!("Rule {parent_id}")));
        }
        let prefix = request.uri_prefix.as_deref().unwrap_or_default();
        Ok(request
            .correspondences
            .iter()
            .map(|c| {
                let target = c
                    .target_property
                    .clone()
                    .unwrap_or_else(|| format!("{prefix}{}", c.source_path));
                generated_payload(&c.source_path, &target, c.kind)
            })
            .collect())
    }

    async fn prefixes(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.state.lock().await.fixture.prefixes.clone())
    }

    async fn example_values(&self, _rule_id: &str) -> Result<BTreeMap<String, Vec<String>>> {
        Ok(self.state.lock().await.fixture.example_values.clone())
    }

    async fn term_info(&self, uri: &str) -> Result<TermInfo> {
        let state = self.state.lock().await;
        state
            .fixture
            .terms
            .get(uri)
            .cloned()
            .map(|generic_info| TermInfo { generic_info })
            .ok_or_else(|| ServiceError::service(404, "Not Found", format!("Term {uri}")))
    }

    async fn validate_path(&self, path_expression: &str) -> Result<ValidationResult> {
        Ok(check_path_expression(path_expression))
    }

    async fn validate_uri_pattern(&self, pattern: &str) -> Result<ValidationResult> {
        check_uri_pattern(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn service() -> InMemoryRuleService {
        let tree: MappingRule = serde_json::from_value(json!({
            "type": "root",
            "id": "root",
            "rules": {"propertyRules": [
                {"type": "direct", "id": "city", "sourcePath": "city",
                 "metadata": {"label": "City"}}
            ]}
        }))
        .unwrap();
        InMemoryRuleService::new(TaskRef::new("p", "t"), tree).unwrap()
    }

    #[tokio::test]
    async fn update_applies_merge_patch() {
        let svc = service();
        svc.update_rule("city", &json!({"metadata": {"description": "where"}}))
            .await
            .unwrap();
        let tree = svc.tree().await;
        let city = tree.get("city").unwrap();
        assert_eq!(city.metadata().label.as_deref(), Some("City"));
        assert_eq!(city.metadata().description.as_deref(), Some("where"));
    }

    #[tokio::test]
    async fn append_assigns_ids_to_new_rules() {
        let svc = service();
        let rule = svc
            .append_rule(
                "root",
                &json!({
                    "type": "object",
                    "rules": {"uriRule": {"type": "uri", "pattern": "ex:{id}"}, "propertyRules": []}
                }),
            )
            .await
            .unwrap();
        assert!(rule.id().starts_with("object"));
        assert!(rule.uri_rule_id().is_some());
        assert_eq!(svc.tree().await.property_rule_ids("root").len(), 2);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let svc = service();
        svc.fail_next(Operation::FetchTree, 1).await;
        assert_eq!(svc.fetch_tree().await.unwrap_err().status(), Some(500));
        assert!(svc.fetch_tree().await.is_ok());
    }

    #[tokio::test]
    async fn copy_places_clone_after_source() {
        let svc = service();
        svc.append_rule("root", &json!({"type": "direct", "id": "name"}))
            .await
            .unwrap();
        let response = svc
            .copy_rule(
                "root",
                &CopyRuleRequest {
                    source_project: "p".to_string(),
                    source_task: "t".to_string(),
                    source_rule: "city".to_string(),
                    after_rule_id: Some("city".to_string()),
                },
            )
            .await
            .unwrap();
        let tree = svc.tree().await;
        assert_eq!(
            tree.property_rule_ids("root"),
            ["city".to_string(), response.id.clone(), "name".to_string()]
        );
        assert_eq!(
            tree.get(&response.id).unwrap().metadata().label.as_deref(),
            Some("City")
        );
    }

    #[tokio::test]
    async fn fixture_mutations_are_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.json");
        let fixture = Fixture::new(TaskRef::new("p", "t"), service().tree().await.into_root());
        std::fs::write(&path, serde_json::to_vec(&fixture).unwrap()).unwrap();

        let svc = InMemoryRuleService::open(&path).await.unwrap();
        svc.delete_rule("city").await.unwrap();

        let saved: Fixture = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(saved.tree.children().unwrap().property_rules.is_empty());
    }
}

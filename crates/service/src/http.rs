use crate::error::{Result, ServiceError};
use crate::service::{RuleService, TaskRef};
use async_trait::async_trait;
use mapping_protocol::{
    CopyRuleRequest, CopyRuleResponse, ErrorBody, GenerateRulesRequest, MappingRule,
    PathValidationRequest, SourcePathInfo, SuggestionRequest, TermInfo,
    UriPatternValidationRequest, ValidationResult, VocabularyInfos, VocabularyMatchResponse,
};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Rule service over the REST API.
#[derive(Debug, Clone)]
pub struct HttpRuleService {
    client: Client,
    base_url: Url,
    task: TaskRef,
}

impl HttpRuleService {
    pub fn new(base_url: &str, task: TaskRef, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|err| ServiceError::Validation(format!("Invalid base url {base_url}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::Validation(format!(
                "Base url {base_url} cannot carry a path"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ServiceError::Network(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url,
            task,
        })
    }

    /// `{base}/{segments...}` with every segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ServiceError::Validation(format!("Base url {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `{base}/transform/tasks/{project}/{task}/{segments...}`
    fn task_endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut all = vec!["transform", "tasks", self.task.project.as_str(), self.task.task.as_str()];
        all.extend_from_slice(segments);
        self.endpoint(&all)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        log::debug!("{method} {url}");
        self.client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<ErrorBody>(&text).unwrap_or_else(|_| {
            ErrorBody::new(
                status.canonical_reason().unwrap_or("Request failed"),
                text.trim(),
            )
        });
        log::debug!("Rule service answered {status}: {body}");
        Err(ServiceError::Service {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl RuleService for HttpRuleService {
    fn task(&self) -> &TaskRef {
        &self.task
    }

    async fn fetch_tree(&self) -> Result<MappingRule> {
        let url = self.task_endpoint(&["rules"])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn update_rule(&self, rule_id: &str, patch: &Value) -> Result<()> {
        let url = self.task_endpoint(&["rule", rule_id])?;
        self.send(self.request(Method::PUT, url).json(patch)).await?;
        Ok(())
    }

    async fn append_rule(&self, parent_id: &str, payload: &Value) -> Result<MappingRule> {
        let url = self.task_endpoint(&["rule", parent_id, "rules"])?;
        self.send_json(self.request(Method::POST, url).json(payload))
            .await
    }

    async fn delete_rule(&self, rule_id: &str) -> Result<()> {
        let url = self.task_endpoint(&["rule", rule_id])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn reorder_rules(&self, parent_id: &str, ordered: &[String]) -> Result<()> {
        let url = self.task_endpoint(&["rule", parent_id, "rules", "reorder"])?;
        self.send(self.request(Method::POST, url).json(ordered))
            .await?;
        Ok(())
    }

    async fn copy_rule(
        &self,
        append_to: &str,
        request: &CopyRuleRequest,
    ) -> Result<CopyRuleResponse> {
        let url = self.task_endpoint(&["rule", append_to, "rules", "copyFrom"])?;
        let mut query = vec![
            ("sourceProject", request.source_project.as_str()),
            ("sourceTask", request.source_task.as_str()),
            ("sourceRule", request.source_rule.as_str()),
        ];
        if let Some(after) = request.after_rule_id.as_deref() {
            query.push(("afterRuleId", after));
        }
        self.send_json(self.request(Method::POST, url).query(&query).json(request))
            .await
    }

    async fn vocabulary_infos(&self) -> Result<VocabularyInfos> {
        let url = self.task_endpoint(&["targetVocabulary", "vocabularies"])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn match_vocabulary(
        &self,
        request: &SuggestionRequest,
    ) -> Result<Option<VocabularyMatchResponse>> {
        let url = self.endpoint(&["ontologyMatching", "matchVocabularyClassDataset"])?;
        match self
            .send_json(self.request(Method::POST, url).json(request))
            .await
        {
            Ok(response) => Ok(Some(response)),
            Err(err) if err.is_plain_not_found() => {
                log::info!("Vocabulary matching is not available for {}", self.task);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn value_source_paths(&self, rule_id: &str) -> Result<Vec<SourcePathInfo>> {
        let url = self.task_endpoint(&["rule", rule_id, "valueSourcePathsInfo"])?;
        self.send_json(self.request(Method::GET, url).query(&[("objectInfo", "true")]))
            .await
    }

    async fn generate_rules(
        &self,
        parent_id: &str,
        request: &GenerateRulesRequest,
    ) -> Result<Vec<Value>> {
        let url = self.endpoint(&[
            "ontologyMatching",
            "rulesGenerator",
            self.task.project.as_str(),
            self.task.task.as_str(),
            "rule",
            parent_id,
        ])?;
        self.send_json(self.request(Method::POST, url).json(request))
            .await
    }

    async fn prefixes(&self) -> Result<BTreeMap<String, String>> {
        let url = self.endpoint(&["api", "workspace", "projects", self.task.project.as_str(), "prefixes"])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn example_values(&self, rule_id: &str) -> Result<BTreeMap<String, Vec<String>>> {
        let url = self.endpoint(&[
            "profiling",
            "schemaClass",
            self.task.project.as_str(),
            self.task.task.as_str(),
            "ruleExampleValues",
        ])?;
        self.send_json(self.request(Method::GET, url).query(&[("ruleId", rule_id)]))
            .await
    }

    async fn term_info(&self, uri: &str) -> Result<TermInfo> {
        let url = self.task_endpoint(&["targetVocabulary", "typeOrProperty"])?;
        self.send_json(self.request(Method::GET, url).query(&[("uri", uri)]))
            .await
    }

    async fn validate_path(&self, path_expression: &str) -> Result<ValidationResult> {
        if path_expression.is_empty() {
            return Ok(ValidationResult::ok());
        }
        let url = self.endpoint(&[
            "api",
            "workspace",
            "validation",
            "sourcePath",
            self.task.project.as_str(),
        ])?;
        let body = PathValidationRequest {
            path_expression: path_expression.to_string(),
        };
        self.send_json(self.request(Method::POST, url).json(&body))
            .await
    }

    async fn validate_uri_pattern(&self, pattern: &str) -> Result<ValidationResult> {
        let url = self.endpoint(&[
            "api",
            "workspace",
            "validation",
            "uriPattern",
            self.task.project.as_str(),
        ])?;
        let body = UriPatternValidationRequest {
            uri_pattern: pattern.to_string(),
        };
        self.send_json(self.request(Method::POST, url).json(&body))
            .await
    }
}

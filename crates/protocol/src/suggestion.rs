use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether a suggested target is a value property or an object property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum CandidateKind {
    Value,
    Object,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionCandidate {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(rename = "type")]
    pub kind: CandidateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
}

/// One matched source (or target, when matching from the vocabulary side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceMatch {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub candidates: Vec<SuggestionCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionIssues {
    #[serde(default)]
    pub not_found_classes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyMatchResponse {
    #[serde(default)]
    pub matches: Vec<SourceMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<SuggestionIssues>,
}

/// Body of the vocabulary-class matching request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    pub project_name: String,
    pub transform_task_name: String,
    pub dataset_uri_prefix: String,
    pub target_class_uris: Vec<String>,
    pub nr_candidates: usize,
    pub add_meta_data: bool,
    pub data_type_properties_only: bool,
    pub rule_id: String,
    pub match_from_dataset: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_vocabularies: Option<Vec<String>>,
}

/// A source value path with its usage info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourcePathInfo {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub already_mapped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_info: Option<serde_json::Value>,
}

/// Merged suggestion row as displayed in the suggestion table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRow {
    /// Source path (or target uri when matching from the vocabulary side).
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub candidates: Vec<SuggestionCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub already_mapped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_info: Option<serde_json::Value>,
}

impl From<SourceMatch> for SuggestionRow {
    fn from(m: SourceMatch) -> Self {
        Self {
            uri: m.uri,
            label: m.label,
            description: m.description,
            candidates: m.candidates,
            already_mapped: None,
            path_type: None,
            graph: m.graph,
            object_info: None,
        }
    }
}

impl From<SourcePathInfo> for SuggestionRow {
    fn from(info: SourcePathInfo) -> Self {
        Self {
            uri: info.path,
            label: None,
            description: None,
            candidates: Vec::new(),
            already_mapped: info.already_mapped,
            path_type: info.path_type,
            graph: None,
            object_info: info.object_info,
        }
    }
}

/// Canonical source -> target pair accepted for rule generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Correspondence {
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_property: Option<String>,
    #[serde(rename = "type")]
    pub kind: CandidateKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRulesRequest {
    pub correspondences: Vec<Correspondence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyInfo {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nr_classes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nr_properties: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VocabularyInfos {
    #[serde(default)]
    pub vocabularies: Vec<VocabularyInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn suggestion_request_uses_service_field_names() {
        let request = SuggestionRequest {
            project_name: "p".to_string(),
            transform_task_name: "t".to_string(),
            dataset_uri_prefix: String::new(),
            target_class_uris: vec!["ex:Person".to_string()],
            nr_candidates: 20,
            add_meta_data: true,
            data_type_properties_only: false,
            rule_id: "root".to_string(),
            match_from_dataset: true,
            target_vocabularies: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["projectName"], "p");
        assert_eq!(value["nrCandidates"], 20);
        assert_eq!(value["matchFromDataset"], true);
        assert!(value.get("targetVocabularies").is_none());
    }

    #[test]
    fn candidate_kind_reads_type_field() {
        let candidate: SuggestionCandidate = serde_json::from_str(
            r#"{"uri": "ex:name", "confidence": 0.8, "type": "value", "label": "name"}"#,
        )
        .unwrap();
        assert_eq!(candidate.kind, CandidateKind::Value);
        assert_eq!(candidate.label.as_deref(), Some("name"));
    }
}

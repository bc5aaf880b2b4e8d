use mapping_editor::{SuggestionSet, WarningSource};
use mapping_protocol::{MappingRule, RuleKind, SuggestionRow, VocabularyInfo};
use mapping_tree::Breadcrumb;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleOutput {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub breadcrumbs: Vec<Breadcrumb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    pub rule: MappingRule,
}

#[derive(Debug, Serialize)]
pub struct RuleRefOutput {
    pub id: String,
    pub kind: RuleKind,
}

#[derive(Debug, Serialize)]
pub struct MoveOutput {
    pub container: String,
    pub order: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedOutput {
    pub created: Vec<RuleRefOutput>,
}

impl CreatedOutput {
    pub fn new(rules: &[MappingRule]) -> Self {
        Self {
            created: rules
                .iter()
                .map(|rule| RuleRefOutput {
                    id: rule.id().to_string(),
                    kind: rule.kind(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WarningOutput {
    pub source: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestOutput {
    pub match_from_dataset: bool,
    pub matching_skipped: bool,
    pub vocabularies: Vec<VocabularyInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub not_found_classes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<WarningOutput>,
    pub rows: Vec<SuggestionRow>,
}

impl SuggestOutput {
    pub fn new(set: &SuggestionSet, rows: Vec<SuggestionRow>) -> Self {
        Self {
            match_from_dataset: set.match_from_dataset,
            matching_skipped: set.matching_skipped,
            vocabularies: set.vocabularies.clone(),
            not_found_classes: set.not_found_classes.clone(),
            warnings: set
                .warnings
                .iter()
                .map(|warning| WarningOutput {
                    source: match warning.source {
                        WarningSource::Vocabularies => "vocabularies",
                        WarningSource::Matching => "matching",
                        WarningSource::SourcePaths => "sourcePaths",
                    },
                    message: warning.error.to_string(),
                })
                .collect(),
            rows,
        }
    }
}

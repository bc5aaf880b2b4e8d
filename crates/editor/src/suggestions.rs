use crate::error::Result;
use mapping_protocol::{
    CandidateKind, Correspondence, SourcePathInfo, SuggestionRequest, SuggestionRow,
    VocabularyInfo, VocabularyMatchResponse,
};
use mapping_service::{RuleService, ServiceError};
use std::collections::HashMap;
use std::sync::Arc;

/// What to match and in which direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionQuery {
    /// Container whose property rules are being suggested.
    pub rule_id: String,
    pub target_class_uris: Vec<String>,
    /// True: rows are source paths with target candidates. False: rows are
    /// target properties with source path candidates.
    pub match_from_dataset: bool,
    /// Restricts matching to these vocabularies; `None` uses all of them.
    pub vocabularies: Option<Vec<String>>,
    pub dataset_uri_prefix: String,
}

impl SuggestionQuery {
    pub fn new(rule_id: impl Into<String>, target_class_uris: Vec<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            target_class_uris,
            match_from_dataset: true,
            vocabularies: None,
            dataset_uri_prefix: String::new(),
        }
    }
}

/// Which of the two concurrent fetches a warning came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSource {
    Vocabularies,
    Matching,
    SourcePaths,
}

#[derive(Debug, Clone)]
pub struct SuggestionWarning {
    pub source: WarningSource,
    pub error: ServiceError,
}

/// Merged result of one suggestion load.
#[derive(Debug, Clone, Default)]
pub struct SuggestionSet {
    pub rows: Vec<SuggestionRow>,
    pub match_from_dataset: bool,
    pub vocabularies: Vec<VocabularyInfo>,
    /// Matching did not run because the task has no vocabularies.
    pub matching_skipped: bool,
    pub not_found_classes: Vec<String>,
    pub warnings: Vec<SuggestionWarning>,
}

/// Merges vocabulary matches with the unused-source-path listing.
///
/// Paths are merged only when matching from the dataset side. A path with no
/// match becomes a row without candidates; a matched path takes over
/// `pathType` and `alreadyMapped` from the listing.
pub fn merge_rows(
    matches: Option<VocabularyMatchResponse>,
    source_paths: Vec<SourcePathInfo>,
    match_from_dataset: bool,
) -> Vec<SuggestionRow> {
    let mut rows: Vec<SuggestionRow> = matches
        .map(|response| response.matches.into_iter().map(SuggestionRow::from).collect())
        .unwrap_or_default();
    if !match_from_dataset {
        return rows;
    }

    let mut by_uri: HashMap<String, usize> = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| (row.uri.clone(), idx))
        .collect();
    for info in source_paths {
        match by_uri.get(&info.path) {
            Some(&idx) => {
                let row = &mut rows[idx];
                row.path_type = info.path_type;
                row.already_mapped = info.already_mapped;
            }
            None => {
                by_uri.insert(info.path.clone(), rows.len());
                rows.push(SuggestionRow::from(info));
            }
        }
    }
    rows
}

fn describe(label: Option<&str>, uri: &str, description: Option<&str>) -> String {
    let mut text = match label {
        Some(label) => format!("{label} {uri}"),
        None => uri.to_string(),
    };
    if let Some(description) = description {
        text.push(' ');
        text.push_str(description);
    }
    text.to_lowercase()
}

/// Case-insensitive filter: every word must occur in the label, uri or
/// description of the row or of its best candidate.
pub fn filter_rows<'a>(rows: &'a [SuggestionRow], text: &str) -> Vec<&'a SuggestionRow> {
    let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
    if words.is_empty() {
        return rows.iter().collect();
    }
    rows.iter()
        .filter(|row| {
            let mut haystack = describe(row.label.as_deref(), &row.uri, row.description.as_deref());
            if let Some(best) = row.candidates.first() {
                haystack.push(' ');
                haystack.push_str(&describe(
                    best.label.as_deref(),
                    &best.uri,
                    best.description.as_deref(),
                ));
            }
            words.iter().all(|word| haystack.contains(word.as_str()))
        })
        .collect()
}

/// A row the user accepted, in the orientation it was displayed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedSuggestion {
    /// The row's own uri.
    pub uri: String,
    /// The chosen candidate, if any.
    pub candidate: Option<String>,
    pub kind: CandidateKind,
}

/// Turns accepted rows back into source -> target pairs.
///
/// In the swapped view the row is the target and the candidate the source; a
/// swapped row without a chosen source has nothing to map and is dropped.
pub fn normalize_correspondences(
    accepted: &[AcceptedSuggestion],
    match_from_dataset: bool,
) -> Vec<Correspondence> {
    accepted
        .iter()
        .filter_map(|item| {
            if match_from_dataset {
                Some(Correspondence {
                    source_path: item.uri.clone(),
                    target_property: item.candidate.clone(),
                    kind: item.kind,
                })
            } else {
                let source_path = item.candidate.clone()?;
                Some(Correspondence {
                    source_path,
                    target_property: Some(item.uri.clone()).filter(|uri| !uri.is_empty()),
                    kind: item.kind,
                })
            }
        })
        .collect()
}

/// Loads, re-directs and refines suggestions for one container.
pub struct SuggestionEngine {
    service: Arc<dyn RuleService>,
    nr_candidates: usize,
    query: Option<SuggestionQuery>,
    current: Option<SuggestionSet>,
    loading: bool,
}

impl SuggestionEngine {
    pub fn new(service: Arc<dyn RuleService>, nr_candidates: usize) -> Self {
        Self {
            service,
            nr_candidates,
            query: None,
            current: None,
            loading: false,
        }
    }

    pub fn query(&self) -> Option<&SuggestionQuery> {
        self.query.as_ref()
    }

    pub fn current(&self) -> Option<&SuggestionSet> {
        self.current.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn close(&mut self) {
        self.query = None;
        self.current = None;
        self.loading = false;
    }

    /// Fetches vocabularies, then runs matching and the source path listing
    /// concurrently.
    pub async fn load(&mut self, query: SuggestionQuery) -> Result<&SuggestionSet> {
        self.loading = true;
        let mut warnings = Vec::new();
        let vocabularies = match self.service.vocabulary_infos().await {
            Ok(infos) => infos.vocabularies,
            Err(error) => {
                log::warn!("Could not list vocabularies: {error}");
                warnings.push(SuggestionWarning {
                    source: WarningSource::Vocabularies,
                    error,
                });
                Vec::new()
            }
        };
        let matching_skipped = vocabularies.is_empty();
        if matching_skipped {
            log::info!("No vocabularies for {}, skipping matching", self.service.task());
        }

        let request = self.request(&query);
        let service = self.service.clone();
        let matching = async {
            if matching_skipped {
                Ok(None)
            } else {
                service.match_vocabulary(&request).await
            }
        };
        let (matched, paths) = tokio::join!(matching, service.value_source_paths(&query.rule_id));

        let mut not_found_classes = Vec::new();
        let matches = match matched {
            Ok(matches) => {
                if let Some(issues) = matches.as_ref().and_then(|m| m.issues.as_ref()) {
                    not_found_classes = issues.not_found_classes.clone();
                }
                matches
            }
            Err(error) => {
                log::warn!("Vocabulary matching failed: {error}");
                warnings.push(SuggestionWarning {
                    source: WarningSource::Matching,
                    error,
                });
                None
            }
        };
        let paths = paths.unwrap_or_else(|error| {
            log::warn!("Listing source paths failed: {error}");
            warnings.push(SuggestionWarning {
                source: WarningSource::SourcePaths,
                error,
            });
            Vec::new()
        });

        let rows = merge_rows(matches, paths, query.match_from_dataset);
        log::debug!("Loaded {} suggestion rows for {}", rows.len(), query.rule_id);
        let set = SuggestionSet {
            rows,
            match_from_dataset: query.match_from_dataset,
            vocabularies,
            matching_skipped,
            not_found_classes,
            warnings,
        };
        self.query = Some(query);
        self.loading = false;
        Ok(self.current.insert(set))
    }

    /// Reloads with the matching direction flipped.
    pub async fn swap(&mut self) -> Result<Option<&SuggestionSet>> {
        let Some(mut query) = self.query.clone() else {
            return Ok(None);
        };
        query.match_from_dataset = !query.match_from_dataset;
        self.load(query).await.map(Some)
    }

    /// Reloads restricted to `vocabularies` (`None` or empty uses all).
    pub async fn refine(&mut self, vocabularies: Option<Vec<String>>) -> Result<Option<&SuggestionSet>> {
        let Some(mut query) = self.query.clone() else {
            return Ok(None);
        };
        query.vocabularies = vocabularies.filter(|v| !v.is_empty());
        self.load(query).await.map(Some)
    }

    /// Rows of the current set matching `text`; never refetches.
    pub fn filtered(&self, text: &str) -> Vec<&SuggestionRow> {
        self.current
            .as_ref()
            .map(|set| filter_rows(&set.rows, text))
            .unwrap_or_default()
    }

    fn request(&self, query: &SuggestionQuery) -> SuggestionRequest {
        let task = self.service.task();
        SuggestionRequest {
            project_name: task.project.clone(),
            transform_task_name: task.task.clone(),
            dataset_uri_prefix: query.dataset_uri_prefix.clone(),
            target_class_uris: query.target_class_uris.clone(),
            nr_candidates: self.nr_candidates,
            add_meta_data: true,
            data_type_properties_only: false,
            rule_id: query.rule_id.clone(),
            match_from_dataset: query.match_from_dataset,
            target_vocabularies: query.vocabularies.clone().filter(|v| !v.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapping_protocol::{SourceMatch, SuggestionCandidate};
    use pretty_assertions::assert_eq;

    fn candidate(uri: &str, label: &str) -> SuggestionCandidate {
        SuggestionCandidate {
            uri: uri.to_string(),
            label: Some(label.to_string()),
            description: None,
            confidence: 0.9,
            kind: CandidateKind::Value,
            graph: None,
        }
    }

    fn matched(uri: &str, candidates: Vec<SuggestionCandidate>) -> SourceMatch {
        SourceMatch {
            uri: uri.to_string(),
            label: None,
            description: None,
            candidates,
            graph: None,
        }
    }

    fn path(path: &str, already_mapped: bool) -> SourcePathInfo {
        SourcePathInfo {
            path: path.to_string(),
            path_type: Some("value".to_string()),
            already_mapped: Some(already_mapped),
            object_info: None,
        }
    }

    #[test]
    fn matched_path_takes_usage_info() {
        let response = VocabularyMatchResponse {
            matches: vec![matched("p1", vec![candidate("ex:name", "Name")])],
            issues: None,
        };
        let rows = merge_rows(Some(response), vec![path("p1", true), path("p2", false)], true);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].uri, "p1");
        assert_eq!(rows[0].candidates.len(), 1);
        assert_eq!(rows[0].already_mapped, Some(true));
        assert_eq!(rows[0].path_type.as_deref(), Some("value"));
        assert_eq!(rows[1].uri, "p2");
        assert!(rows[1].candidates.is_empty());
    }

    #[test]
    fn swapped_direction_ignores_paths() {
        let response = VocabularyMatchResponse {
            matches: vec![matched("ex:name", vec![])],
            issues: None,
        };
        let rows = merge_rows(Some(response), vec![path("p1", false)], false);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].already_mapped, None);
    }

    #[test]
    fn filter_requires_every_word() {
        let rows = merge_rows(
            Some(VocabularyMatchResponse {
                matches: vec![
                    matched("firstName", vec![candidate("ex:givenName", "Given name")]),
                    matched("city", vec![candidate("ex:locality", "Locality")]),
                ],
                issues: None,
            }),
            Vec::new(),
            true,
        );
        let hits: Vec<&str> = filter_rows(&rows, "FIRST given")
            .into_iter()
            .map(|r| r.uri.as_str())
            .collect();
        assert_eq!(hits, vec!["firstName"]);
        assert!(filter_rows(&rows, "first locality").is_empty());
        assert_eq!(filter_rows(&rows, "  ").len(), 2);
    }

    #[test]
    fn filter_searches_uris_of_labelled_rows() {
        let mut labelled = matched("firstName", vec![candidate("ex:givenName", "Given name")]);
        labelled.label = Some("First name".to_string());
        let rows = merge_rows(
            Some(VocabularyMatchResponse {
                matches: vec![labelled],
                issues: None,
            }),
            Vec::new(),
            true,
        );
        assert_eq!(filter_rows(&rows, "givenName").len(), 1);
        assert_eq!(filter_rows(&rows, "firstName").len(), 1);
        assert_eq!(filter_rows(&rows, "first ex:given").len(), 1);
        assert!(filter_rows(&rows, "surname").is_empty());
    }

    #[test]
    fn swapped_rows_are_normalized_to_source_target() {
        let accepted = vec![
            AcceptedSuggestion {
                uri: "ex:name".to_string(),
                candidate: Some("name".to_string()),
                kind: CandidateKind::Value,
            },
            AcceptedSuggestion {
                uri: "ex:age".to_string(),
                candidate: None,
                kind: CandidateKind::Value,
            },
        ];
        assert_eq!(
            normalize_correspondences(&accepted, false),
            vec![Correspondence {
                source_path: "name".to_string(),
                target_property: Some("ex:name".to_string()),
                kind: CandidateKind::Value,
            }]
        );
        let direct = normalize_correspondences(&accepted, true);
        assert_eq!(direct.len(), 2);
        assert_eq!(direct[1].source_path, "ex:age");
        assert_eq!(direct[1].target_property, None);
    }
}

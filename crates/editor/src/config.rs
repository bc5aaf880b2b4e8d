use crate::error::{EditorError, Result};
use mapping_service::TaskRef;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;
pub const MAX_BATCH_CONCURRENCY: usize = 16;
pub const DEFAULT_SUGGESTION_CANDIDATES: usize = 20;
pub const DEFAULT_LABEL_CACHE_CAPACITY: usize = 512;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_BASE_URL: &str = "MAPPING_EDITOR_BASE_URL";
pub const ENV_PROJECT: &str = "MAPPING_EDITOR_PROJECT";
pub const ENV_TASK: &str = "MAPPING_EDITOR_TASK";
pub const ENV_BATCH_CONCURRENCY: &str = "MAPPING_EDITOR_BATCH_CONCURRENCY";
pub const ENV_CLIPBOARD: &str = "MAPPING_EDITOR_CLIPBOARD";

/// Validated editor settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditorConfig {
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub project: Option<String>,
    pub task: Option<String>,
    pub show_value_mappings: bool,
    pub track_address: bool,
    pub batch_concurrency: usize,
    pub label_cache_capacity: usize,
    pub clipboard_path: Option<PathBuf>,
    pub suggestion_candidates: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            project: None,
            task: None,
            show_value_mappings: false,
            track_address: true,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            label_cache_capacity: DEFAULT_LABEL_CACHE_CAPACITY,
            clipboard_path: None,
            suggestion_candidates: DEFAULT_SUGGESTION_CANDIDATES,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    service: RawService,
    #[serde(default)]
    task: RawTask,
    #[serde(default)]
    editor: RawEditor,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawService {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTask {
    project: Option<String>,
    task: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEditor {
    show_value_mappings: Option<bool>,
    track_address: Option<bool>,
    batch_concurrency: Option<usize>,
    label_cache_capacity: Option<usize>,
    clipboard_path: Option<PathBuf>,
    suggestion_candidates: Option<usize>,
}

impl EditorConfig {
    /// Reads `path` (when given) and applies environment overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|err| {
                    EditorError::config("config", format!("cannot read {}: {err}", path.display()))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawConfig =
            toml::from_str(text).map_err(|err| EditorError::config("config", err.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let defaults = Self::default();
        let timeout_secs = raw.service.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(EditorError::config("service.timeout_secs", "must be positive"));
        }
        let label_cache_capacity = raw
            .editor
            .label_cache_capacity
            .unwrap_or(defaults.label_cache_capacity);
        if label_cache_capacity == 0 {
            return Err(EditorError::config(
                "editor.label_cache_capacity",
                "must be positive",
            ));
        }
        let suggestion_candidates = raw
            .editor
            .suggestion_candidates
            .unwrap_or(defaults.suggestion_candidates);
        if suggestion_candidates == 0 {
            return Err(EditorError::config(
                "editor.suggestion_candidates",
                "must be positive",
            ));
        }

        Ok(Self {
            base_url: non_empty(raw.service.base_url),
            timeout: Duration::from_secs(timeout_secs),
            project: non_empty(raw.task.project),
            task: non_empty(raw.task.task),
            show_value_mappings: raw
                .editor
                .show_value_mappings
                .unwrap_or(defaults.show_value_mappings),
            track_address: raw.editor.track_address.unwrap_or(defaults.track_address),
            batch_concurrency: raw
                .editor
                .batch_concurrency
                .unwrap_or(defaults.batch_concurrency)
                .clamp(1, MAX_BATCH_CONCURRENCY),
            label_cache_capacity,
            clipboard_path: raw.editor.clipboard_path,
            suggestion_candidates,
        })
    }

    /// Applies `MAPPING_EDITOR_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = non_empty(lookup(ENV_BASE_URL)) {
            self.base_url = Some(url);
        }
        if let Some(project) = non_empty(lookup(ENV_PROJECT)) {
            self.project = Some(project);
        }
        if let Some(task) = non_empty(lookup(ENV_TASK)) {
            self.task = Some(task);
        }
        if let Some(path) = non_empty(lookup(ENV_CLIPBOARD)) {
            self.clipboard_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(ENV_BATCH_CONCURRENCY) {
            self.batch_concurrency = parse_batch_concurrency(Some(&raw), self.batch_concurrency)?;
        }
        Ok(())
    }

    pub fn task_ref(&self) -> Result<TaskRef> {
        let project = self
            .project
            .clone()
            .ok_or_else(|| EditorError::config("task.project", "no project configured"))?;
        let task = self
            .task
            .clone()
            .ok_or_else(|| EditorError::config("task.task", "no transformation task configured"))?;
        Ok(TaskRef::new(project, task))
    }

    pub fn clipboard_path(&self) -> PathBuf {
        self.clipboard_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("mapping-editor-clipboard.json"))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Blank input keeps `default_value`; numbers are clamped to the allowed range.
pub fn parse_batch_concurrency(raw: Option<&str>, default_value: usize) -> Result<usize> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(default_value.clamp(1, MAX_BATCH_CONCURRENCY));
    };
    raw.parse::<usize>()
        .map(|v| v.clamp(1, MAX_BATCH_CONCURRENCY))
        .map_err(|err| EditorError::config("editor.batch_concurrency", format!("{raw}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn parse_batch_concurrency_defaults_and_clamps() {
        assert_eq!(parse_batch_concurrency(None, 5).unwrap(), 5);
        assert_eq!(parse_batch_concurrency(Some("   "), 5).unwrap(), 5);
        assert_eq!(parse_batch_concurrency(Some("2"), 5).unwrap(), 2);
        assert_eq!(parse_batch_concurrency(Some("0"), 5).unwrap(), 1);
        assert_eq!(
            parse_batch_concurrency(Some("999"), 5).unwrap(),
            MAX_BATCH_CONCURRENCY
        );
        assert_eq!(parse_batch_concurrency(Some(" 7 "), 5).unwrap(), 7);
        assert!(matches!(
            parse_batch_concurrency(Some("abc"), 5),
            Err(EditorError::Config { key, .. }) if key == "editor.batch_concurrency"
        ));
    }

    #[test]
    fn reads_toml_sections() {
        let config = EditorConfig::from_toml_str(
            r#"
            [service]
            base_url = "http://localhost:9090"
            timeout_secs = 5

            [task]
            project = "movies"
            task = "transform"

            [editor]
            show_value_mappings = true
            batch_concurrency = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:9090"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.task_ref().unwrap(), TaskRef::new("movies", "transform"));
        assert!(config.show_value_mappings);
        assert!(config.track_address);
        assert_eq!(config.batch_concurrency, 3);
        assert_eq!(config.suggestion_candidates, DEFAULT_SUGGESTION_CANDIDATES);
    }

    #[test]
    fn rejects_unknown_keys_and_zero_values() {
        assert!(EditorConfig::from_toml_str("[editor]\nbogus = 1").is_err());
        let err = EditorConfig::from_toml_str("[editor]\nsuggestion_candidates = 0").unwrap_err();
        assert!(matches!(err, EditorError::Config { key, .. } if key == "editor.suggestion_candidates"));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = EditorConfig::from_toml_str("[task]\nproject = \"a\"").unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_PROJECT, "b"),
            (ENV_TASK, "t"),
            (ENV_BATCH_CONCURRENCY, "40"),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.task_ref().unwrap(), TaskRef::new("b", "t"));
        assert_eq!(config.batch_concurrency, MAX_BATCH_CONCURRENCY);
    }

    #[test]
    fn missing_task_is_a_config_error() {
        let err = EditorConfig::default().task_ref().unwrap_err();
        assert!(matches!(err, EditorError::Config { key, .. } if key == "task.project"));
    }

    #[tokio::test]
    async fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("editor.toml");
        std::fs::write(&path, "[editor]\nlabel_cache_capacity = 8\n").unwrap();
        let config = EditorConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.label_cache_capacity, 8);
    }
}

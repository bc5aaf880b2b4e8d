use crate::error::{EditorError, Result};
use async_trait::async_trait;
use mapping_protocol::RuleKind;
use mapping_service::TaskRef;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Pending copy or clone, shared across editor sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardRecord {
    pub project: String,
    #[serde(alias = "transform")]
    pub task: String,
    #[serde(rename = "id")]
    pub rule_id: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub cloning: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl ClipboardRecord {
    pub fn copy(task: &TaskRef, rule_id: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            project: task.project.clone(),
            task: task.task.clone(),
            rule_id: rule_id.into(),
            kind,
            cloning: false,
            parent_id: None,
        }
    }

    pub fn clone_of(
        task: &TaskRef,
        rule_id: impl Into<String>,
        kind: RuleKind,
        parent_id: impl Into<String>,
    ) -> Self {
        Self {
            cloning: true,
            parent_id: Some(parent_id.into()),
            ..Self::copy(task, rule_id, kind)
        }
    }

    pub fn source_task(&self) -> TaskRef {
        TaskRef::new(self.project.clone(), self.task.clone())
    }
}

/// Single slot, last writer wins.
#[async_trait]
pub trait ClipboardStore: Send + Sync {
    async fn get(&self) -> Result<Option<ClipboardRecord>>;

    async fn set(&self, record: &ClipboardRecord) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryClipboard {
    slot: Mutex<Option<ClipboardRecord>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClipboardStore for MemoryClipboard {
    async fn get(&self) -> Result<Option<ClipboardRecord>> {
        Ok(self.slot.lock().await.clone())
    }

    async fn set(&self, record: &ClipboardRecord) -> Result<()> {
        *self.slot.lock().await = Some(record.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot.lock().await = None;
        Ok(())
    }
}

/// Clipboard kept as a JSON file so copy and paste work across processes.
#[derive(Debug, Clone)]
pub struct FileClipboard {
    path: PathBuf,
}

impl FileClipboard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ClipboardStore for FileClipboard {
    async fn get(&self) -> Result<Option<ClipboardRecord>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(EditorError::Clipboard(format!(
                    "cannot read {}: {err}",
                    self.path.display()
                )))
            }
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        // A corrupt slot behaves like an empty one; the next copy overwrites it.
        match serde_json::from_str(&text) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                log::warn!("Ignoring unreadable clipboard {}: {err}", self.path.display());
                Ok(None)
            }
        }
    }

    async fn set(&self, record: &ClipboardRecord) -> Result<()> {
        let text = serde_json::to_string_pretty(record)
            .map_err(|err| EditorError::Clipboard(err.to_string()))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|err| EditorError::Clipboard(format!("{}: {err}", dir.display())))?;
        }
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|err| EditorError::Clipboard(format!("{}: {err}", self.path.display())))?;
        log::debug!("Clipboard now holds {} rule {}", record.kind, record.rule_id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(EditorError::Clipboard(format!(
                "{}: {err}",
                self.path.display()
            ))),
        }
    }
}

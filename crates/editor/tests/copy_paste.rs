mod support;

use mapping_editor::{
    ClipboardRecord, ClipboardStore, EditorCommand, EditorController, EditorError, EditorEvent,
    FileClipboard, MemoryClipboard,
};
use mapping_protocol::{MappingRule, RuleKind};
use mapping_service::{InMemoryRuleService, Operation, RuleService, TaskRef};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use support::{backend, config, task};

async fn editor_with(
    backend: &Arc<InMemoryRuleService>,
    clipboard: Arc<dyn ClipboardStore>,
) -> EditorController {
    let service: Arc<dyn RuleService> = backend.clone();
    let mut editor = EditorController::new(service, clipboard, config());
    editor.start().await.unwrap();
    editor
}

#[tokio::test]
async fn copy_then_paste_a_value_rule() {
    let backend = backend();
    let clipboard = Arc::new(MemoryClipboard::new());
    let mut editor = editor_with(&backend, clipboard.clone()).await;
    let mut events = editor.subscribe();

    editor
        .handle(EditorCommand::Copy {
            id: "city".to_string(),
            kind: RuleKind::Direct,
        })
        .await
        .unwrap();
    assert!(matches!(events.try_recv().unwrap(), EditorEvent::Notice { .. }));

    let new_id = editor.paste(false).await.unwrap();

    let requests = backend.copy_requests().await;
    assert_eq!(requests.len(), 1);
    let (append_to, request) = &requests[0];
    assert_eq!(append_to, "root");
    assert_eq!(request.source_rule, "city");
    assert_eq!(request.after_rule_id, None);
    assert_eq!(
        serde_json::to_value(request).unwrap()["afterRuleId"],
        serde_json::Value::Null
    );

    assert_eq!(editor.take_just_pasted(), Some(new_id.clone()));
    assert_eq!(editor.take_just_pasted(), None);
    assert!(editor.tree().unwrap().contains(&new_id));
    assert_eq!(editor.current_rule_id(), None);

    // A plain copy stays on the clipboard.
    assert!(clipboard.get().await.unwrap().is_some());
    let calls = backend.calls().await;
    assert_eq!(calls.last(), Some(&Operation::FetchTree));
}

#[tokio::test]
async fn cloning_an_object_lands_next_to_it_and_navigates() {
    let backend = backend();
    let clipboard = Arc::new(MemoryClipboard::new());
    let mut editor = editor_with(&backend, clipboard.clone()).await;
    editor.navigate("address").await.unwrap();

    let new_id = editor
        .clone_rule("address", RuleKind::Object, None)
        .await
        .unwrap();

    let (append_to, request) = backend.copy_requests().await.pop().unwrap();
    assert_eq!(append_to, "root");
    assert_eq!(request.after_rule_id.as_deref(), Some("address"));

    let tree = backend.tree().await;
    let order = tree.property_rule_ids("root").to_vec();
    assert_eq!(order, vec!["city".to_string(), "address".to_string(), new_id.clone()]);

    assert_eq!(editor.current_rule_id(), Some(new_id.as_str()));
    assert_eq!(editor.take_just_pasted(), None);
    assert_eq!(clipboard.get().await.unwrap(), None);
}

#[tokio::test]
async fn cloning_a_value_rule_inserts_after_it() {
    let backend = backend();
    let mut editor = editor_with(&backend, Arc::new(MemoryClipboard::new())).await;
    editor.navigate("address").await.unwrap();

    let new_id = editor
        .clone_rule("street", RuleKind::Direct, None)
        .await
        .unwrap();
    let tree = editor.tree().unwrap();
    assert_eq!(
        tree.property_rule_ids("address").to_vec(),
        vec!["street".to_string(), new_id.clone(), "geo".to_string()]
    );
    assert_eq!(editor.take_just_pasted(), Some(new_id));
}

#[tokio::test]
async fn failed_paste_rolls_back_the_preview() {
    let backend = backend();
    let clipboard = Arc::new(MemoryClipboard::new());
    let mut editor = editor_with(&backend, clipboard.clone()).await;
    clipboard
        .set(&ClipboardRecord::copy(&task(), "city", RuleKind::Direct))
        .await
        .unwrap();
    backend.fail_next(Operation::CopyRule, 1).await;

    let before = editor.tree().unwrap().len();
    let err = editor
        .handle(EditorCommand::Paste { cloning: false })
        .await
        .unwrap_err();
    assert!(matches!(err, EditorError::Service(_)));
    assert_eq!(editor.tree().unwrap().len(), before);
    assert!(editor.banner().is_some());
    assert_eq!(editor.take_just_pasted(), None);
}

#[tokio::test]
async fn paste_with_empty_clipboard_fails() {
    let backend = backend();
    let mut editor = editor_with(&backend, Arc::new(MemoryClipboard::new())).await;
    let err = editor.paste(false).await.unwrap_err();
    assert!(matches!(err, EditorError::Clipboard(_)));
    assert!(backend.copy_requests().await.is_empty());
}

#[tokio::test]
async fn paste_from_another_task_through_a_file_clipboard() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clipboard.json");

    let other = TaskRef::new("library", "books");
    let other_tree: MappingRule = serde_json::from_value(json!({
        "type": "root",
        "id": "root",
        "rules": {"propertyRules": [
            {"type": "direct", "id": "title", "sourcePath": "title",
             "mappingTarget": {"uri": "ex:title"}}
        ]}
    }))
    .unwrap();
    FileClipboard::new(&path)
        .set(&ClipboardRecord::copy(&other, "title", RuleKind::Direct))
        .await
        .unwrap();

    let backend = backend();
    backend.add_source_task(other, other_tree).await.unwrap();
    let mut editor = editor_with(&backend, Arc::new(FileClipboard::new(&path))).await;
    let new_id = editor.paste(false).await.unwrap();

    let (_, request) = backend.copy_requests().await.pop().unwrap();
    assert_eq!(request.source_project, "library");
    assert_eq!(request.source_task, "books");
    let pasted = editor.tree().unwrap().get(&new_id).unwrap();
    assert_eq!(pasted.source_path(), Some("title"));
}

#[tokio::test]
async fn file_clipboard_survives_reopening_and_clears() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("clipboard.json");
    let record = ClipboardRecord::clone_of(&task(), "address", RuleKind::Object, "root");

    FileClipboard::new(&path).set(&record).await.unwrap();
    let reopened = FileClipboard::new(&path);
    assert_eq!(reopened.get().await.unwrap(), Some(record));

    reopened.clear().await.unwrap();
    assert_eq!(reopened.get().await.unwrap(), None);
    reopened.clear().await.unwrap();
}

#[tokio::test]
async fn corrupt_file_clipboard_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clipboard.json");
    std::fs::write(&path, "{not json").unwrap();
    assert_eq!(FileClipboard::new(&path).get().await.unwrap(), None);
}

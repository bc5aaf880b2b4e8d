#![allow(dead_code)]

use mapping_editor::{EditorConfig, EditorController, MemoryClipboard};
use mapping_protocol::MappingRule;
use mapping_service::{InMemoryRuleService, RuleService, TaskRef};
use serde_json::json;
use std::sync::Arc;

pub fn task() -> TaskRef {
    TaskRef::new("movies", "transform")
}

/// root -> [uri "rootUri", direct "city", object "address" -> [uri, direct "street", object "geo"]]
pub fn sample_tree() -> MappingRule {
    serde_json::from_value(json!({
        "type": "root",
        "id": "root",
        "rules": {
            "uriRule": {"type": "uri", "id": "rootUri", "pattern": "ex:person/{id}"},
            "typeRules": [{"type": "type", "typeUri": "ex:Person"}],
            "propertyRules": [
                {"type": "direct", "id": "city", "sourcePath": "city",
                 "mappingTarget": {"uri": "ex:city"}},
                {"type": "object", "id": "address", "sourcePath": "address",
                 "mappingTarget": {"uri": "ex:address"},
                 "rules": {
                    "uriRule": {"type": "uri", "id": "addressUri", "pattern": "ex:addr/{id}"},
                    "typeRules": [{"type": "type", "typeUri": "ex:Address"}],
                    "propertyRules": [
                        {"type": "direct", "id": "street", "sourcePath": "street",
                         "mappingTarget": {"uri": "ex:street"}},
                        {"type": "object", "id": "geo",
                         "mappingTarget": {"uri": "ex:geo"},
                         "rules": {"propertyRules": []}}
                    ]
                 }}
            ]
        }
    }))
    .unwrap()
}

pub fn backend() -> Arc<InMemoryRuleService> {
    Arc::new(InMemoryRuleService::new(task(), sample_tree()).unwrap())
}

pub fn config() -> EditorConfig {
    EditorConfig {
        project: Some("movies".to_string()),
        task: Some("transform".to_string()),
        ..EditorConfig::default()
    }
}

/// Started controller over `backend` with an in-memory clipboard.
pub async fn editor(backend: &Arc<InMemoryRuleService>) -> EditorController {
    let service: Arc<dyn RuleService> = backend.clone();
    let mut editor = EditorController::new(service, Arc::new(MemoryClipboard::new()), config());
    editor.start().await.unwrap();
    editor
}

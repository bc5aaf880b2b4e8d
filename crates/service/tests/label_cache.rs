use mapping_protocol::{GenericInfo, MappingRule};
use mapping_service::{
    InMemoryRuleService, LabelField, RuleService, TaskRef, VocabularyLabelCache,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn backend() -> Arc<InMemoryRuleService> {
    let tree: MappingRule =
        serde_json::from_value(json!({"type": "root", "id": "root"})).unwrap();
    Arc::new(InMemoryRuleService::new(TaskRef::new("p", "t"), tree).unwrap())
}

fn info(label: &str, description: &str) -> GenericInfo {
    GenericInfo {
        uri: None,
        label: Some(label.to_string()),
        description: Some(description.to_string()),
    }
}

#[tokio::test]
async fn reads_through_and_serves_from_cache() {
    let backend = backend();
    backend.set_term("ex:name", info("Name", "A name")).await;
    let service: Arc<dyn RuleService> = backend.clone();
    let cache = VocabularyLabelCache::new(service, 8);

    assert_eq!(cache.get("ex:name", LabelField::Label).await.as_deref(), Some("Name"));

    // Served from cache even after the backend changes.
    backend.set_term("ex:name", info("Renamed", "Other")).await;
    assert_eq!(
        cache.get("ex:name", LabelField::Description).await.as_deref(),
        Some("A name")
    );

    cache.invalidate().await;
    assert_eq!(cache.get("ex:name", LabelField::Label).await.as_deref(), Some("Renamed"));
}

#[tokio::test]
async fn failed_lookups_are_cached_negatively() {
    let backend = backend();
    let service: Arc<dyn RuleService> = backend.clone();
    let cache = VocabularyLabelCache::new(service, 8);

    assert_eq!(cache.get("ex:unknown", LabelField::Label).await, None);
    backend.set_term("ex:unknown", info("Known now", "")).await;
    assert_eq!(cache.get("ex:unknown", LabelField::Label).await, None);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn update_entry_only_touches_cached_terms() {
    let backend = backend();
    backend.set_term("ex:city", info("City", "Town")).await;
    let service: Arc<dyn RuleService> = backend.clone();
    let cache = VocabularyLabelCache::new(service, 8);

    assert!(!cache.update_entry("ex:city", Some("X".to_string()), None).await);
    assert_eq!(cache.len().await, 0);

    cache.get("ex:city", LabelField::Label).await;
    assert!(cache.update_entry("ex:city", Some("Place".to_string()), None).await);
    assert_eq!(cache.get("ex:city", LabelField::Label).await.as_deref(), Some("Place"));
    assert_eq!(cache.get("ex:city", LabelField::Description).await, None);
}

#[tokio::test]
async fn capacity_evicts_least_recently_used() {
    let backend = backend();
    for uri in ["ex:a", "ex:b", "ex:c"] {
        backend.set_term(uri, info(uri, "")).await;
    }
    let service: Arc<dyn RuleService> = backend.clone();
    let cache = VocabularyLabelCache::new(service, 2);

    cache.get("ex:a", LabelField::Label).await;
    cache.get("ex:b", LabelField::Label).await;
    cache.get("ex:c", LabelField::Label).await;
    assert_eq!(cache.len().await, 2);
    assert!(!cache.update_entry("ex:a", None, None).await);
}

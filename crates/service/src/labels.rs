use crate::service::RuleService;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelField {
    Label,
    Description,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CachedTerm {
    label: Option<String>,
    description: Option<String>,
}

impl CachedTerm {
    fn field(&self, field: LabelField) -> Option<String> {
        match field {
            LabelField::Label => self.label.clone(),
            LabelField::Description => self.description.clone(),
        }
    }
}

/// Read-through cache of vocabulary term labels and descriptions.
///
/// Failed lookups are cached as empty entries and are not retried until the
/// cache is invalidated.
pub struct VocabularyLabelCache {
    service: Arc<dyn RuleService>,
    entries: Mutex<LruCache<String, CachedTerm>>,
}

impl VocabularyLabelCache {
    pub const DEFAULT_CAPACITY: usize = 512;

    pub fn new(service: Arc<dyn RuleService>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            service,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn get(&self, uri: &str, field: LabelField) -> Option<String> {
        if let Some(term) = self.entries.lock().await.get(uri) {
            return term.field(field);
        }

        let term = match self.service.term_info(uri).await {
            Ok(info) => CachedTerm {
                label: info.generic_info.label,
                description: info.generic_info.description,
            },
            Err(err) => {
                log::debug!("No vocabulary info for {uri}: {err}");
                CachedTerm::default()
            }
        };
        let value = term.field(field);
        self.entries.lock().await.put(uri.to_string(), term);
        value
    }

    /// Overwrites label and description of `uri`, only if it is cached.
    pub async fn update_entry(
        &self,
        uri: &str,
        label: Option<String>,
        description: Option<String>,
    ) -> bool {
        match self.entries.lock().await.get_mut(uri) {
            Some(term) => {
                term.label = label;
                term.description = description;
                true
            }
            None => false,
        }
    }

    pub async fn invalidate(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

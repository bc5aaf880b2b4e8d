use mapping_protocol::CandidateKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A form that may hold unsaved edits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditKey {
    Rule(String),
    /// The create-rule form or the suggestion panel.
    NewRule,
}

impl EditKey {
    pub fn rule(id: impl Into<String>) -> Self {
        EditKey::Rule(id.into())
    }
}

/// An action held back until the user decides about unsaved edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PendingIntent {
    Navigate(String),
    ToggleAll { expanded: bool },
    ShowSuggestions,
    CreateRule(CandidateKind),
    Reload,
}

impl PendingIntent {
    /// Expanding rows never drops an open form.
    pub fn discards_edits(&self) -> bool {
        !matches!(self, PendingIntent::ToggleAll { expanded: true })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Proceed(PendingIntent),
    Deferred,
}

/// Open edit forms plus the one action waiting for a discard decision.
#[derive(Debug, Default, Clone)]
pub struct EditTracker {
    editing: BTreeSet<EditKey>,
    pending: Option<PendingIntent>,
}

impl EditTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the form was already open.
    pub fn open(&mut self, key: EditKey) -> bool {
        self.editing.insert(key)
    }

    pub fn close(&mut self, key: &EditKey) -> bool {
        self.editing.remove(key)
    }

    pub fn discard_all(&mut self) {
        self.editing.clear();
    }

    pub fn is_editing(&self, key: &EditKey) -> bool {
        self.editing.contains(key)
    }

    pub fn is_clean(&self) -> bool {
        self.editing.is_empty()
    }

    pub fn editing(&self) -> impl Iterator<Item = &EditKey> {
        self.editing.iter()
    }

    pub fn pending(&self) -> Option<&PendingIntent> {
        self.pending.as_ref()
    }

    /// Lets `intent` through when nothing would be lost, else parks it.
    /// A newer request replaces an older parked one.
    pub fn request(&mut self, intent: PendingIntent) -> Gate {
        if self.is_clean() || !intent.discards_edits() {
            return Gate::Proceed(intent);
        }
        log::debug!("Deferring {intent:?}, {} form(s) open", self.editing.len());
        self.pending = Some(intent);
        Gate::Deferred
    }

    /// Drops all edits and hands back the parked intent.
    pub fn confirm(&mut self) -> Option<PendingIntent> {
        let intent = self.pending.take()?;
        self.editing.clear();
        Some(intent)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

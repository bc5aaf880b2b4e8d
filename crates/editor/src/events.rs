use crate::batch::BatchProgress;
use crate::edit_tracker::{EditKey, PendingIntent};
use crate::suggestions::AcceptedSuggestion;
use mapping_protocol::{CandidateKind, RuleKind};
use serde::Serialize;

/// Everything leaf views can ask the editor to do.
///
/// Views never touch editor state directly; they send one of these and
/// listen for [`EditorEvent`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorCommand {
    /// A form started holding edits.
    RuleViewChange { key: EditKey },
    /// A form is back to its saved values.
    RuleViewUnchanged { key: EditKey },
    RuleViewClose { key: EditKey },
    DiscardAll,
    /// Expand or collapse one row.
    Toggle { id: String, expanded: bool },
    Navigate { id: String },
    /// Click on a row: navigate for containers, expand for values.
    SelectRow { id: String },
    ToggleAll { expanded: bool },
    Reload,
    /// Suggest property rules for the target types of the container in view.
    ShowSuggestions,
    CloseSuggestions,
    SwapSuggestions,
    RefineSuggestions { vocabularies: Option<Vec<String>> },
    AcceptSuggestions {
        accepted: Vec<AcceptedSuggestion>,
        uri_prefix: Option<String>,
    },
    CreateRule { kind: CandidateKind },
    ConfirmDiscard,
    CancelDiscard,
    Copy { id: String, kind: RuleKind },
    Clone {
        id: String,
        kind: RuleKind,
        parent_id: Option<String>,
    },
    Paste { cloning: bool },
    Reorder { from: usize, to: usize },
    Remove { id: String },
    Shutdown,
}

/// Notifications published by the editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EditorEvent {
    Reloaded { rules: usize },
    Navigated { rule_id: Option<String> },
    DiscardRequested { pending: PendingIntent },
    /// A form to create a rule of this kind should open.
    CreateRuleRequested { kind: CandidateKind },
    SuggestionsShown { rows: usize },
    SuggestionProgress(BatchProgress),
    SuggestionsClosed,
    /// Short-lived message, e.g. after a copy.
    Notice { message: String },
    /// Dismissible error message.
    Banner { message: String },
    Pasted { id: String, kind: RuleKind },
}

//! Editing engine for hierarchical mapping rules.
//!
//! [`EditorController`] owns the rule tree, the navigation state and the set
//! of open edit forms. Views talk to it through [`EditorCommand`]s and listen
//! to [`EditorEvent`]s; every action that could drop unsaved edits passes the
//! [`EditTracker`] gate first.

pub mod address;
pub mod batch;
pub mod clipboard;
pub mod config;
pub mod controller;
pub mod edit_tracker;
pub mod error;
pub mod events;
pub mod navigation;
pub mod reorder;
pub mod suggestions;

pub use address::{editor_href, AddressSync};
pub use batch::{
    create_rules, generate_and_create, BatchConcurrencySnapshot, BatchLimiter, BatchProgress,
};
pub use clipboard::{ClipboardRecord, ClipboardStore, FileClipboard, MemoryClipboard};
pub use config::EditorConfig;
pub use controller::{EditorController, LoadState, LoadTicket};
pub use edit_tracker::{EditKey, EditTracker, Gate, PendingIntent};
pub use error::{BatchFailure, EditorError, Result};
pub use events::{EditorCommand, EditorEvent};
pub use navigation::{build_panel, flatten, FlatRow, Navigation, RuleRow, Selection, TreeNode};
pub use reorder::{move_item, OptimisticEdit};
pub use suggestions::{
    filter_rows, merge_rows, normalize_correspondences, AcceptedSuggestion, SuggestionEngine,
    SuggestionQuery, SuggestionSet, SuggestionWarning, WarningSource,
};

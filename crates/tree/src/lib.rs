//! Mapping rule tree held as an id-indexed arena.
//!
//! The nested [`MappingRule`](mapping_protocol::MappingRule) returned by the
//! rule service stays the source of truth; [`RuleTree`] keeps a flat index of
//! every rule id with its parent, child ids and position so lookups, ancestor
//! chains and sibling moves do not need a tree walk.

pub mod error;
pub mod patch;
pub mod tree;
pub mod types;

pub use error::{Result, TreeError};
pub use patch::{merge_patch, patch_rule};
pub use tree::{reassign_ids, RuleTree};
pub use types::{Breadcrumb, PathStep, RuleLookup, RuleNode};

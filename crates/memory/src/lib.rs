//! Long-term memory persistence for DawnAgent.
//!
//! Memory lives in a single free-form markdown document. New dated entries
//! are anchored under its `## SESSION LOG` marker, and its size is tracked
//! against a token budget so the assembled prompt stays small.

pub mod document;

pub use document::{
    DEFAULT_BUDGET_TOKENS, MemoryBudget, MemoryStore, SESSION_LOG_MARKER, insert_entry,
};

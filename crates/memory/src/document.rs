//! Memory document store: dated session-log entries in a markdown file.
//!
//! The document is free-form text with one positional anchor, the
//! [`SESSION_LOG_MARKER`]. A new entry *replaces the first occurrence of the
//! marker itself* with `marker + entry`, so whatever followed the old marker
//! stays below the new entry. Without a marker, marker and entry are appended.
//!
//! Writes replace the whole file (temp file + rename). There is no
//! cross-process coordination: one active writer is assumed.

use chrono::{Local, NaiveDateTime};
use dawnagent_core::error::MemoryError;
use dawnagent_core::token::estimate_tokens;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Anchor under which dated entries are inserted.
pub const SESSION_LOG_MARKER: &str = "## SESSION LOG";

/// Default memory size budget, in estimated tokens.
pub const DEFAULT_BUDGET_TOKENS: usize = 600;

/// Size status of the memory document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBudget {
    /// Estimated tokens (characters / 4)
    pub token_count: usize,
    /// Threshold the estimate was checked against
    pub threshold: usize,
    /// `token_count > threshold`
    pub over_budget: bool,
    /// Human-readable advice
    pub recommendation: String,
}

impl MemoryBudget {
    fn evaluate(token_count: usize, threshold: usize) -> Self {
        let over_budget = token_count > threshold;
        let recommendation = if over_budget {
            format!(
                "Memory is ~{token_count} tokens (budget: {threshold}). \
                 Summarise oldest 3 session log entries into one ARCHIVED entry."
            )
        } else {
            format!("Memory is within budget ({token_count} tokens).")
        };
        Self {
            token_count,
            threshold,
            over_budget,
            recommendation,
        }
    }
}

/// Reads and updates the persistent memory document.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full document.
    pub fn read(&self) -> Result<String, MemoryError> {
        std::fs::read_to_string(&self.path).map_err(|e| MemoryError::Unreadable {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Insert `block` as a new entry stamped with the current local time.
    pub fn write_update(&self, block: &str) -> Result<(), MemoryError> {
        self.write_update_at(block, Local::now().naive_local())
    }

    /// Insert `block` as a new entry stamped with `now`.
    ///
    /// Fails without writing when the existing document cannot be read.
    pub fn write_update_at(&self, block: &str, now: NaiveDateTime) -> Result<(), MemoryError> {
        let existing = self.read()?;
        let timestamp = now.format("%Y-%m-%d %H:%M").to_string();
        let updated = insert_entry(&existing, block, &timestamp);

        self.replace_contents(&updated)?;
        debug!(path = %self.path.display(), %timestamp, "Memory update written");
        Ok(())
    }

    /// Check the document size against `threshold` estimated tokens.
    ///
    /// An unreadable document counts as empty.
    pub fn check_token_budget(&self, threshold: usize) -> MemoryBudget {
        let content = match self.read() {
            Ok(content) => content,
            Err(e) => {
                debug!(error = %e, "Memory document unreadable, budget computed as empty");
                String::new()
            }
        };
        MemoryBudget::evaluate(estimate_tokens(&content), threshold)
    }

    fn replace_contents(&self, content: &str) -> Result<(), MemoryError> {
        let write_failed = |e: std::io::Error| MemoryError::WriteFailed {
            path: self.path.clone(),
            reason: e.to_string(),
        };

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        std::fs::write(&tmp, content).map_err(write_failed)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            warn!(tmp = %tmp.display(), error = %e, "Memory rename failed, removing temp file");
            let _ = std::fs::remove_file(&tmp);
            return Err(write_failed(e));
        }
        Ok(())
    }
}

/// Place a dated entry for `block` into `document`.
///
/// Result is trimmed and ends with exactly one newline.
pub fn insert_entry(document: &str, block: &str, timestamp: &str) -> String {
    let entry = format!("{SESSION_LOG_MARKER}\n\n### [{timestamp}]\n{block}\n");

    let updated = if document.contains(SESSION_LOG_MARKER) {
        document.replacen(SESSION_LOG_MARKER, &entry, 1)
    } else {
        format!("{}\n\n{entry}", document.trim())
    };

    format!("{}\n", updated.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const BLOCK: &str = "---MEMORY UPDATE---\nslept badly\n---END UPDATE---";

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn store_with(content: &str) -> (tempfile::TempDir, MemoryStore) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("memory.md");
        std::fs::write(&path, content).unwrap();
        (tmp, MemoryStore::new(path))
    }

    #[test]
    fn marker_absent_appends_header_and_entry() {
        let out = insert_entry("# User Memory\nName: Dana\n\n", BLOCK, "2026-03-14 07:05");
        assert_eq!(
            out,
            "# User Memory\nName: Dana\n\n## SESSION LOG\n\n### [2026-03-14 07:05]\n\
             ---MEMORY UPDATE---\nslept badly\n---END UPDATE---\n"
        );
    }

    #[test]
    fn marker_present_replaces_first_occurrence_only() {
        let doc = "# Memory\n\n## SESSION LOG\n\n### [2026-03-13 07:00]\nold entry\n\n\
                   ## SESSION LOG\n(second marker)\n";
        let out = insert_entry(doc, "new entry", "2026-03-14 07:05");

        // The new entry is now the first item under the header, old content follows.
        let new_pos = out.find("### [2026-03-14 07:05]\nnew entry").unwrap();
        let old_pos = out.find("### [2026-03-13 07:00]\nold entry").unwrap();
        assert!(new_pos < old_pos);
        assert!(out.contains("(second marker)"));
        assert_eq!(out.matches(SESSION_LOG_MARKER).count(), 2);
    }

    #[test]
    fn replace_leaves_old_entries_below_new_without_reheading_them() {
        // Literal behaviour: the marker text itself is replaced, there is no
        // separate insertion point after it.
        let out = insert_entry("## SESSION LOG\nprior", "fresh", "2026-03-14 07:05");
        assert_eq!(out, "## SESSION LOG\n\n### [2026-03-14 07:05]\nfresh\n\nprior\n");
    }

    #[test]
    fn output_has_single_trailing_newline() {
        let out = insert_entry("\n\n  text  \n\n\n", "b", "t");
        assert!(out.ends_with("b\n"));
        assert!(!out.ends_with("\n\n"));
        assert!(out.starts_with("text"));
    }

    #[test]
    fn write_update_persists_whole_document() {
        let (_tmp, store) = store_with("# Memory\nlikes tea\n");
        store.write_update_at(BLOCK, at(7, 5)).unwrap();

        let content = store.read().unwrap();
        assert!(content.starts_with("# Memory\nlikes tea\n\n## SESSION LOG"));
        assert!(content.contains("### [2026-03-14 07:05]"));
        assert!(content.contains("slept badly"));
    }

    #[test]
    fn successive_updates_put_newest_first() {
        let (_tmp, store) = store_with("# Memory\n");
        store.write_update_at("first", at(7, 0)).unwrap();
        store.write_update_at("second", at(8, 30)).unwrap();

        let content = store.read().unwrap();
        assert_eq!(content.matches(SESSION_LOG_MARKER).count(), 1);
        assert!(content.find("second").unwrap() < content.find("first").unwrap());
        assert!(content.contains("### [2026-03-14 08:30]"));
    }

    #[test]
    fn unreadable_document_fails_without_writing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing.md");
        let store = MemoryStore::new(&path);

        let err = store.write_update_at(BLOCK, at(7, 0)).unwrap_err();
        assert!(matches!(err, MemoryError::Unreadable { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn no_temp_file_left_behind() {
        let (tmp, store) = store_with("x");
        store.write_update_at("y", at(6, 0)).unwrap();
        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("memory.md")]);
    }

    #[test]
    fn budget_at_threshold_is_within() {
        let (_tmp, store) = store_with(&"m".repeat(2400));
        let budget = store.check_token_budget(DEFAULT_BUDGET_TOKENS);
        assert_eq!(budget.token_count, 600);
        assert!(!budget.over_budget);
        assert_eq!(budget.recommendation, "Memory is within budget (600 tokens).");
    }

    #[test]
    fn budget_over_threshold_recommends_archiving() {
        let (_tmp, store) = store_with(&"m".repeat(2404));
        let budget = store.check_token_budget(DEFAULT_BUDGET_TOKENS);
        assert_eq!(budget.token_count, 601);
        assert!(budget.over_budget);
        assert!(budget.recommendation.contains("~601 tokens (budget: 600)"));
        assert!(budget.recommendation.contains("oldest 3 session log entries"));
        assert!(budget.recommendation.contains("ARCHIVED"));
    }

    #[test]
    fn budget_of_unreadable_document_is_empty() {
        let store = MemoryStore::new("/nonexistent/dawnagent/memory.md");
        let budget = store.check_token_budget(10);
        assert_eq!(budget.token_count, 0);
        assert!(!budget.over_budget);
    }

    #[test]
    fn budget_serializes() {
        let budget = MemoryBudget::evaluate(3, 600);
        let json = serde_json::to_string(&budget).unwrap();
        assert!(json.contains(r#""over_budget":false"#));
    }
}

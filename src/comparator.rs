//! Snapshot comparison
//!
//! [`compare`] classifies every path of two snapshots into one
//! [`Modification`] category:
//!
//! | previous | current | result |
//! |----------|---------|--------|
//! | absent   | present | `Added` |
//! | present  | absent  | `Deleted` |
//! | present  | present | `ContentModified`, `DateModified` or nothing |
//!
//! For a path present on both sides a length change is always a content
//! change. In [`CompareMode::Full`] two fingerprints produced by the same hash
//! mode are compared as well. Otherwise a different modification time yields
//! `DateModified`.
//!
//! Renames and copies are not correlated: a rename shows up as one deleted
//! and one added path. Use [`crate::duplicates`] to relate files by content.

use crate::snapshot::Snapshot;
use crate::types::{FileRecord, Modification, ModificationCounts};
use std::collections::HashMap;
use tracing::debug;

/// How thoroughly two records are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareMode {
    /// Length and modification time only
    Fast,
    /// Also compare fingerprints when both sides carry comparable ones
    #[default]
    Full,
}

/// Classification of every changed path between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompareResult {
    /// Paths only in the current snapshot
    pub added: Vec<String>,
    /// Paths only in the previous snapshot
    pub deleted: Vec<String>,
    /// Paths whose content changed
    pub content_modified: Vec<String>,
    /// Paths whose modification time alone changed
    pub date_modified: Vec<String>,
}

impl CompareResult {
    /// Sorted paths of one category
    pub fn files(&self, modification: Modification) -> &[String] {
        match modification {
            Modification::Added => &self.added,
            Modification::Deleted => &self.deleted,
            Modification::ContentModified => &self.content_modified,
            Modification::DateModified => &self.date_modified,
        }
    }

    /// Number of paths per category
    pub fn modification_counts(&self) -> ModificationCounts {
        ModificationCounts {
            added: self.added.len(),
            deleted: self.deleted.len(),
            content_modified: self.content_modified.len(),
            date_modified: self.date_modified.len(),
        }
    }

    /// Whether any category is non-empty
    pub fn something_modified(&self) -> bool {
        self.modification_counts().total() > 0
    }

    /// Every changed path with its category, grouped by category
    pub fn iter(&self) -> impl Iterator<Item = (Modification, &str)> {
        Modification::ALL
            .into_iter()
            .flat_map(move |m| self.files(m).iter().map(move |f| (m, f.as_str())))
    }

    fn push(&mut self, modification: Modification, file_name: &str) {
        let list = match modification {
            Modification::Added => &mut self.added,
            Modification::Deleted => &mut self.deleted,
            Modification::ContentModified => &mut self.content_modified,
            Modification::DateModified => &mut self.date_modified,
        };
        list.push(file_name.to_string());
    }
}

/// Category of a path present in both snapshots, `None` when unchanged
pub fn classify(previous: &FileRecord, current: &FileRecord, mode: CompareMode) -> Option<Modification> {
    if previous.file_length != current.file_length {
        return Some(Modification::ContentModified);
    }
    if mode == CompareMode::Full
        && previous.fingerprints_comparable(current)
        && previous.hash != current.hash
    {
        return Some(Modification::ContentModified);
    }
    if previous.last_modified != current.last_modified {
        return Some(Modification::DateModified);
    }
    None
}

/// Compare `previous` against `current`
///
/// Neither snapshot is modified. Each category of the result is sorted.
pub fn compare(previous: &Snapshot, current: &Snapshot, mode: CompareMode) -> CompareResult {
    let previous_by_name: HashMap<&str, &FileRecord> = previous
        .file_states
        .iter()
        .map(|r| (r.file_name.as_str(), r))
        .collect();
    let current_by_name: HashMap<&str, &FileRecord> = current
        .file_states
        .iter()
        .map(|r| (r.file_name.as_str(), r))
        .collect();

    let mut result = CompareResult::default();

    for (name, current_record) in &current_by_name {
        match previous_by_name.get(name) {
            Some(previous_record) => {
                if let Some(m) = classify(previous_record, current_record, mode) {
                    result.push(m, name);
                }
            }
            None => result.push(Modification::Added, name),
        }
    }

    for name in previous_by_name.keys() {
        if !current_by_name.contains_key(name) {
            result.push(Modification::Deleted, name);
        }
    }

    result.added.sort();
    result.deleted.sort();
    result.content_modified.sort();
    result.date_modified.sort();

    debug!(
        "Compared {} previous against {} current files: {:?}",
        previous.file_count,
        current.file_count,
        result.modification_counts()
    );
    result
}

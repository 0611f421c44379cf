//! Core data types used throughout the treeseal library
//!
//! ## Overview
//!
//! - **Scan output**: [`FileRecord`], [`ScanStats`]
//! - **Comparison**: [`Modification`], [`ModificationCounts`]
//! - **Repository**: [`LogEntry`], [`RepositoryMetadata`]

use crate::hashing::HashMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::fmt;
use std::time::Duration;

/// Separates fields inside one hashed object
pub(crate) const FIELD_SEPARATOR: char = '\u{1F}';

/// Terminates one hashed object
pub(crate) const OBJECT_SEPARATOR: char = '\u{1E}';

/// One scanned file
///
/// Created by a hashing worker and never mutated afterwards. Records order by
/// `file_name` so snapshot output is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Repository-relative path with `/` separators
    pub file_name: String,
    /// Length in bytes
    pub file_length: u64,
    /// Last modification time, milliseconds since the Unix epoch
    pub last_modified: i64,
    /// Content fingerprint, absent when the hash mode does not read content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Mode that produced `hash`
    pub hash_mode: HashMode,
}

impl FileRecord {
    /// Feed this record's canonical form into a snapshot integrity hash
    pub(crate) fn hash_into(&self, hasher: &mut Sha512) {
        let fields = [
            "FileState".to_string(),
            self.file_name.clone(),
            self.file_length.to_string(),
            self.last_modified.to_string(),
            self.hash_mode.name().to_string(),
            self.hash.clone().unwrap_or_default(),
        ];
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                hasher.update(FIELD_SEPARATOR.to_string().as_bytes());
            }
            hasher.update(field.as_bytes());
        }
    }

    /// Whether both records carry comparable fingerprints
    pub fn fingerprints_comparable(&self, other: &FileRecord) -> bool {
        self.hash.is_some() && other.hash.is_some() && self.hash_mode == other.hash_mode
    }
}

impl PartialOrd for FileRecord {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileRecord {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.file_name
            .cmp(&other.file_name)
            .then_with(|| self.file_length.cmp(&other.file_length))
            .then_with(|| self.last_modified.cmp(&other.last_modified))
            .then_with(|| self.hash.cmp(&other.hash))
            .then_with(|| self.hash_mode.cmp(&other.hash_mode))
    }
}

/// Category assigned to one path when comparing two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modification {
    /// Present only in the newer snapshot
    Added,
    /// Present only in the older snapshot
    Deleted,
    /// Content differs
    ContentModified,
    /// Content unchanged, modification time changed
    DateModified,
}

impl Modification {
    /// Every category in report order
    pub const ALL: [Modification; 4] = [
        Modification::Added,
        Modification::Deleted,
        Modification::ContentModified,
        Modification::DateModified,
    ];

    /// Short label for reports
    pub fn label(&self) -> &'static str {
        match self {
            Modification::Added => "Added",
            Modification::Deleted => "Deleted",
            Modification::ContentModified => "Content modified",
            Modification::DateModified => "Date modified",
        }
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Per-category counters stored with a snapshot
///
/// Informational only: excluded from snapshot equality and from the integrity
/// hash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationCounts {
    /// Number of added files
    pub added: usize,
    /// Number of deleted files
    pub deleted: usize,
    /// Number of files whose content changed
    pub content_modified: usize,
    /// Number of files whose date only changed
    pub date_modified: usize,
}

impl ModificationCounts {
    /// Count for one category
    pub fn get(&self, modification: Modification) -> usize {
        match modification {
            Modification::Added => self.added,
            Modification::Deleted => self.deleted,
            Modification::ContentModified => self.content_modified,
            Modification::DateModified => self.date_modified,
        }
    }

    /// Increment the counter for one category
    pub fn record(&mut self, modification: Modification) {
        match modification {
            Modification::Added => self.added += 1,
            Modification::Deleted => self.deleted += 1,
            Modification::ContentModified => self.content_modified += 1,
            Modification::DateModified => self.date_modified += 1,
        }
    }

    /// Sum over all categories
    pub fn total(&self) -> usize {
        self.added + self.deleted + self.content_modified + self.date_modified
    }
}

/// Statistics about one scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Files recorded in the snapshot
    pub file_count: usize,
    /// Summed length of those files
    pub content_bytes: u64,
    /// Bytes actually read while fingerprinting
    pub bytes_hashed: u64,
    /// Worker threads used
    pub thread_count: usize,
    /// Wall-clock duration of walk plus hashing
    pub duration: Duration,
}

impl ScanStats {
    /// Hashing throughput in bytes per second
    pub fn throughput(&self) -> u64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            (self.bytes_hashed as f64 / secs) as u64
        } else {
            self.bytes_hashed
        }
    }
}

/// Summary of one committed state, as listed by `log`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// State number, starting at 1
    pub state_number: usize,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Commit comment
    pub comment: String,
    /// Files in the state
    pub file_count: usize,
    /// Summed length of those files
    pub files_content_length: u64,
    /// Hash mode of the scan
    pub hash_mode: HashMode,
    /// Changes relative to the previous state
    pub modification_counts: ModificationCounts,
}

/// Persistent repository information stored in `metadata.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryMetadata {
    /// Layout version
    pub format_version: u32,
    /// Version of treeseal that created the repository
    pub treeseal_version: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Hash mode used when none is given explicitly
    pub default_hash_mode: HashMode,
}

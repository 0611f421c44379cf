//! Snapshot model and persistence
//!
//! A [`Snapshot`] is the result of one scan: every file record plus the set of
//! ignored paths and a little bookkeeping. Snapshots are written once, as
//! gzip-compressed pretty JSON, and later reloaded as read-only values.
//!
//! ## Integrity
//!
//! [`Snapshot::save`] stores a SHA-512 state hash computed over every persisted
//! field except the hash itself and the modification counters. On load the
//! hash is recomputed and compared; a mismatch means the file was altered
//! after it was written and is reported as
//! [`TreesealError::CorruptedSnapshot`].
//!
//! The hashed byte stream is, in order: the tag `Snapshot`, the model version,
//! the timestamp (RFC 3339, nanoseconds), the comment, the file count and the
//! total content length (u64 little endian), the hash mode name, every ignored
//! path, then every file record. Fields are separated by U+001F and objects
//! terminated by U+001E.
//!
//! A snapshot written by a different model version is loaded with a warning
//! instead of being verified, since its field set may differ.
//!
//! ## Example
//!
//! ```rust,ignore
//! use treeseal::snapshot::Snapshot;
//!
//! let mut snapshot = Snapshot::new("nightly", HashMode::HashAll, records, ignored);
//! snapshot.save(&path)?;
//! let loaded = Snapshot::load(&path, true)?;
//! assert_eq!(loaded, snapshot);
//! ```

use crate::error::{Result, TreesealError};
use crate::hashing::HashMode;
use crate::types::{FileRecord, ModificationCounts, FIELD_SEPARATOR, OBJECT_SEPARATOR};
use crate::utils::{atomic_write, relative_name};
use chrono::{DateTime, SecondsFormat, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

/// Model version written by this build
pub const CURRENT_MODEL_VERSION: &str = "1";

const FORMAT_TAG: &str = "Snapshot";

/// One point-in-time record of a directory tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Integrity hash, set by [`Snapshot::save`]
    #[serde(default)]
    pub state_hash: String,
    /// Model version the snapshot was written with
    pub model_version: String,
    /// When the scan started
    pub timestamp: DateTime<Utc>,
    /// Free-text comment
    pub comment: String,
    /// Number of file records
    pub file_count: usize,
    /// Summed length of all records
    pub files_content_length: u64,
    /// Hash mode of the scan
    pub hash_mode: HashMode,
    /// Changes relative to the previous state, informational only
    #[serde(default)]
    pub modification_counts: ModificationCounts,
    /// Root-relative ignored paths, directories end with `/`
    #[serde(default)]
    pub ignored_files: BTreeSet<String>,
    /// File records sorted by path
    pub file_states: Vec<FileRecord>,
}

impl Snapshot {
    /// Assemble a snapshot from scan output
    ///
    /// Records are sorted and the derived counters computed. The timestamp is
    /// the current time; [`crate::Scanner`] replaces it with the time its scan
    /// started. The state hash stays empty until the snapshot is saved.
    pub fn new(
        comment: impl Into<String>,
        hash_mode: HashMode,
        mut file_states: Vec<FileRecord>,
        ignored_files: BTreeSet<String>,
    ) -> Self {
        file_states.sort();
        let mut snapshot = Snapshot {
            state_hash: String::new(),
            model_version: CURRENT_MODEL_VERSION.to_string(),
            timestamp: Utc::now(),
            comment: comment.into(),
            file_count: 0,
            files_content_length: 0,
            hash_mode,
            modification_counts: ModificationCounts::default(),
            ignored_files,
            file_states,
        };
        snapshot.update_counts();
        snapshot
    }

    fn update_counts(&mut self) {
        self.file_count = self.file_states.len();
        self.files_content_length = self.file_states.iter().map(|r| r.file_length).sum();
    }

    /// Compute the integrity hash over the current field values
    pub fn compute_state_hash(&self) -> String {
        let mut hasher = Sha512::new();
        let field = FIELD_SEPARATOR.to_string();
        let object = OBJECT_SEPARATOR.to_string();

        hasher.update(FORMAT_TAG.as_bytes());
        hasher.update(field.as_bytes());
        hasher.update(self.model_version.as_bytes());
        hasher.update(field.as_bytes());
        hasher.update(
            self.timestamp
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .as_bytes(),
        );
        hasher.update(field.as_bytes());
        hasher.update(self.comment.as_bytes());
        hasher.update(field.as_bytes());
        hasher.update((self.file_count as u64).to_le_bytes());
        hasher.update(field.as_bytes());
        hasher.update(self.files_content_length.to_le_bytes());
        hasher.update(field.as_bytes());
        hasher.update(self.hash_mode.name().as_bytes());
        hasher.update(object.as_bytes());

        for ignored in &self.ignored_files {
            hasher.update(ignored.as_bytes());
            hasher.update(object.as_bytes());
        }
        hasher.update(object.as_bytes());

        for record in &self.file_states {
            record.hash_into(&mut hasher);
            hasher.update(object.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Whether the stored state hash matches the content
    pub fn verify_integrity(&self) -> bool {
        self.compute_state_hash() == self.state_hash
    }

    /// Persist to `path`
    ///
    /// Sorts the records, recomputes the derived counters and the state hash,
    /// then writes gzip-compressed JSON through a temporary file.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.file_states.sort();
        self.update_counts();
        self.state_hash = self.compute_state_hash();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        serde_json::to_writer_pretty(&mut encoder, self)?;
        let bytes = encoder.finish()?;
        atomic_write(path, &bytes)?;

        debug!(
            "Saved snapshot with {} files to {:?} ({} compressed bytes)",
            self.file_count,
            path,
            bytes.len()
        );
        Ok(())
    }

    /// Load a snapshot from `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Snapshot file written by [`Snapshot::save`]
    /// * `verify` - Recompute and check the state hash
    ///
    /// # Errors
    ///
    /// - [`TreesealError::MalformedSnapshot`] if the file is not valid gzip JSON
    /// - [`TreesealError::CorruptedSnapshot`] if verification is requested and
    ///   the state hash does not match
    pub fn load(path: &Path, verify: bool) -> Result<Snapshot> {
        let file = File::open(path)?;
        let mut json = Vec::new();
        GzDecoder::new(BufReader::new(file))
            .read_to_end(&mut json)
            .map_err(|e| TreesealError::malformed(path, e))?;
        let snapshot: Snapshot =
            serde_json::from_slice(&json).map_err(|e| TreesealError::malformed(path, e))?;

        if verify {
            if snapshot.model_version != CURRENT_MODEL_VERSION {
                warn!(
                    "Snapshot {:?} uses model version {} (current is {}); integrity not verified",
                    path, snapshot.model_version, CURRENT_MODEL_VERSION
                );
            } else {
                let actual = snapshot.compute_state_hash();
                if actual != snapshot.state_hash {
                    return Err(TreesealError::CorruptedSnapshot {
                        path: path.to_path_buf(),
                        expected: snapshot.state_hash,
                        actual,
                    });
                }
            }
        }

        Ok(snapshot)
    }

    /// Build a new snapshot restricted to, or excluding, one subdirectory
    ///
    /// A record is inside when its path starts with the subdirectory's
    /// root-relative path followed by `/`. When `subdir` is the root itself
    /// every record is inside.
    ///
    /// # Arguments
    ///
    /// * `root` - Repository root
    /// * `subdir` - Directory under `root`
    /// * `keep_inside` - Keep the records inside `subdir` rather than those outside
    pub fn filter_to_subtree(&self, root: &Path, subdir: &Path, keep_inside: bool) -> Result<Snapshot> {
        let prefix = relative_name(subdir, root)?;
        let inside = |name: &str| {
            prefix.is_empty()
                || name
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        };

        let file_states: Vec<FileRecord> = self
            .file_states
            .iter()
            .filter(|r| inside(&r.file_name) == keep_inside)
            .cloned()
            .collect();

        let mut filtered = Snapshot {
            state_hash: String::new(),
            model_version: self.model_version.clone(),
            timestamp: self.timestamp,
            comment: self.comment.clone(),
            file_count: 0,
            files_content_length: 0,
            hash_mode: self.hash_mode,
            modification_counts: self.modification_counts,
            ignored_files: self.ignored_files.clone(),
            file_states,
        };
        filtered.update_counts();
        Ok(filtered)
    }

    /// Look up a record by path
    pub fn get(&self, file_name: &str) -> Option<&FileRecord> {
        self.file_states
            .binary_search_by(|r| r.file_name.as_str().cmp(file_name))
            .ok()
            .map(|i| &self.file_states[i])
    }
}

/// Equality ignores the state hash and the modification counters
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.model_version == other.model_version
            && self.timestamp == other.timestamp
            && self.comment == other.comment
            && self.file_count == other.file_count
            && self.files_content_length == other.files_content_length
            && self.hash_mode == other.hash_mode
            && self.ignored_files == other.ignored_files
            && self.file_states == other.file_states
    }
}

impl Eq for Snapshot {}

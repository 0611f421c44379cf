//! Duplicate detection within one snapshot
//!
//! Records are grouped by fingerprint and length. Only records carrying a
//! fingerprint take part, so a snapshot taken with
//! [`HashMode::DontHash`](crate::HashMode::DontHash) never reports duplicates.
//! With a sampling hash mode two files may share a fingerprint while differing
//! outside the sampled block; only full-content hashing gives certainty.

use crate::snapshot::Snapshot;
use std::collections::HashMap;
use tracing::debug;

/// Paths sharing one content fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// Shared fingerprint
    pub hash: String,
    /// Length of each member
    pub file_length: u64,
    /// Member paths, sorted
    pub files: Vec<String>,
}

impl DuplicateGroup {
    /// Bytes that would be freed by keeping a single copy
    pub fn wasted_bytes(&self) -> u64 {
        self.file_length * (self.files.len() as u64).saturating_sub(1)
    }
}

/// All duplicate groups of one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateReport {
    /// Groups, largest first
    pub groups: Vec<DuplicateGroup>,
}

impl DuplicateReport {
    /// Number of files that belong to some group
    pub fn duplicated_file_count(&self) -> usize {
        self.groups.iter().map(|g| g.files.len()).sum()
    }

    /// Bytes that would be freed by keeping one copy per group
    pub fn wasted_bytes(&self) -> u64 {
        self.groups.iter().map(DuplicateGroup::wasted_bytes).sum()
    }

    /// Whether no duplicate was found
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Group the records of `snapshot` that share identical content
///
/// Groups are ordered by descending member count, then by first path.
pub fn find_duplicates(snapshot: &Snapshot) -> DuplicateReport {
    let mut by_content: HashMap<(&str, u64), Vec<&str>> = HashMap::new();
    for record in &snapshot.file_states {
        if let Some(hash) = record.hash.as_deref() {
            by_content
                .entry((hash, record.file_length))
                .or_default()
                .push(record.file_name.as_str());
        }
    }

    let mut groups: Vec<DuplicateGroup> = by_content
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|((hash, file_length), files)| {
            let mut files: Vec<String> = files.into_iter().map(str::to_string).collect();
            files.sort();
            DuplicateGroup {
                hash: hash.to_string(),
                file_length,
                files,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        b.files
            .len()
            .cmp(&a.files.len())
            .then_with(|| a.files[0].cmp(&b.files[0]))
    });

    debug!("Found {} duplicate groups", groups.len());
    DuplicateReport { groups }
}

//! Repository of committed snapshots
//!
//! A repository is a directory tree with a `.treeseal/` metadata directory at
//! its root:
//!
//! ```text
//! <root>/.treeseal/
//!     metadata.json           repository information
//!     states/state_1.json.gz  first committed snapshot
//!     states/state_2.json.gz  ...
//! ```
//!
//! States are numbered from 1 in commit order and never rewritten. The last
//! state is the reference every `diff`, `commit` and `reset_dates` compares
//! against. Operations given a subdirectory only scan that subtree and only
//! compare the matching part of the last state.
//!
//! ## Example
//!
//! ```rust,ignore
//! use treeseal::{HashMode, RepositoryBuilder};
//!
//! let repo = RepositoryBuilder::new()
//!     .hash_mode(HashMode::HashSmallBlock)
//!     .thread_count(4)
//!     .init(PathBuf::from("/data/photos"))?;
//! repo.commit("initial import")?;
//!
//! let outcome = repo.diff()?;
//! for (modification, file) in outcome.result.iter() {
//!     println!("{}: {}", modification, file);
//! }
//! ```

use crate::comparator::{compare, CompareMode, CompareResult};
use crate::duplicates::{find_duplicates, DuplicateReport};
use crate::error::{Result, TreesealError};
use crate::hashing::HashMode;
use crate::ignore_rules::METADATA_DIR_NAME;
use crate::scanner::{ScanOptions, Scanner};
use crate::snapshot::Snapshot;
use crate::types::{LogEntry, RepositoryMetadata, ScanStats};
use crate::utils::{atomic_write, relative_name};
use chrono::Utc;
use filetime::FileTime;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Layout version written to `metadata.json`
pub const FORMAT_VERSION: u32 = 1;

const METADATA_FILE: &str = "metadata.json";
const STATES_DIR: &str = "states";

/// Outcome of a commit
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// Number of the saved state, `None` when nothing changed
    pub state_number: Option<usize>,
    /// Changes relative to the previous state
    pub result: CompareResult,
    /// Scan statistics
    pub stats: ScanStats,
}

/// Outcome of a diff against the last state
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    /// State compared against
    pub state_number: usize,
    /// Changes since that state
    pub result: CompareResult,
    /// Scan statistics
    pub stats: ScanStats,
}

/// Builder for opening or creating a [`Repository`]
#[derive(Debug, Clone, Default)]
pub struct RepositoryBuilder {
    hash_mode: Option<HashMode>,
    thread_count: Option<usize>,
    verbose: bool,
    compare_mode: CompareMode,
}

impl RepositoryBuilder {
    /// Builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash mode for scans
    ///
    /// When unset, `init` uses [`HashMode::HashAll`] and `open` uses the mode
    /// the repository was created with.
    pub fn hash_mode(mut self, hash_mode: HashMode) -> Self {
        self.hash_mode = Some(hash_mode);
        self
    }

    /// Number of hashing workers, defaults to the CPU count
    pub fn thread_count(mut self, count: usize) -> Self {
        self.thread_count = Some(count.max(1));
        self
    }

    /// Print progress markers while hashing
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// How previous and current records are compared
    pub fn compare_mode(mut self, mode: CompareMode) -> Self {
        self.compare_mode = mode;
        self
    }

    /// Create a repository at `root`
    ///
    /// # Errors
    ///
    /// - [`TreesealError::InvalidPath`] if `root` is not a directory
    /// - [`TreesealError::RepositoryAlreadyExists`] if `root` already holds one
    pub fn init(self, root: impl AsRef<Path>) -> Result<Repository> {
        let root = canonical_dir(root.as_ref())?;
        let metadata_dir = root.join(METADATA_DIR_NAME);
        if metadata_dir.exists() {
            return Err(TreesealError::RepositoryAlreadyExists(root));
        }

        fs::create_dir_all(metadata_dir.join(STATES_DIR))?;
        let metadata = RepositoryMetadata {
            format_version: FORMAT_VERSION,
            treeseal_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            default_hash_mode: self.hash_mode.unwrap_or_default(),
        };
        atomic_write(
            &metadata_dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&metadata)?.as_bytes(),
        )?;

        info!("Initialized repository at {:?}", root);
        Ok(self.build(root, metadata))
    }

    /// Open the repository at `root`
    ///
    /// # Errors
    ///
    /// [`TreesealError::RepositoryNotInitialized`] if `root` holds none.
    pub fn open(self, root: impl AsRef<Path>) -> Result<Repository> {
        let root = canonical_dir(root.as_ref())?;
        let metadata_path = root.join(METADATA_DIR_NAME).join(METADATA_FILE);
        if !metadata_path.exists() {
            return Err(TreesealError::RepositoryNotInitialized(root));
        }

        let metadata: RepositoryMetadata = serde_json::from_str(&fs::read_to_string(&metadata_path)?)?;
        if metadata.format_version != FORMAT_VERSION {
            warn!(
                "Repository format version {} differs from supported version {}",
                metadata.format_version, FORMAT_VERSION
            );
        }

        debug!("Opened repository at {:?}", root);
        Ok(self.build(root, metadata))
    }

    fn build(self, root: PathBuf, metadata: RepositoryMetadata) -> Repository {
        let mut options = ScanOptions::default()
            .with_hash_mode(self.hash_mode.unwrap_or(metadata.default_hash_mode))
            .with_verbose(self.verbose);
        if let Some(count) = self.thread_count {
            options = options.with_thread_count(count);
        }

        Repository {
            metadata_dir: root.join(METADATA_DIR_NAME),
            root,
            metadata,
            options,
            compare_mode: self.compare_mode,
        }
    }
}

fn canonical_dir(path: &Path) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .map_err(|_| TreesealError::InvalidPath(path.to_path_buf()))?;
    if !canonical.is_dir() {
        return Err(TreesealError::InvalidPath(path.to_path_buf()));
    }
    Ok(canonical)
}

/// A directory tree whose snapshots are tracked under `.treeseal/`
#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
    metadata_dir: PathBuf,
    metadata: RepositoryMetadata,
    options: ScanOptions,
    compare_mode: CompareMode,
}

impl Repository {
    /// Create a repository with default settings
    pub fn init(root: impl AsRef<Path>) -> Result<Self> {
        RepositoryBuilder::new().init(root)
    }

    /// Open a repository with default settings
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        RepositoryBuilder::new().open(root)
    }

    /// Canonical repository root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Repository information
    pub fn metadata(&self) -> &RepositoryMetadata {
        &self.metadata
    }

    /// Hash mode used by scans
    pub fn hash_mode(&self) -> HashMode {
        self.options.hash_mode
    }

    /// Path of state `number`
    pub fn state_path(&self, number: usize) -> PathBuf {
        self.metadata_dir
            .join(STATES_DIR)
            .join(format!("state_{}.json.gz", number))
    }

    /// Number of committed states
    pub fn state_count(&self) -> usize {
        let mut count = 0;
        while self.state_path(count + 1).exists() {
            count += 1;
        }
        count
    }

    /// Load state `number`, verifying its integrity hash
    pub fn load_state(&self, number: usize) -> Result<Snapshot> {
        let path = self.state_path(number);
        if number == 0 || !path.exists() {
            return Err(TreesealError::StateNotFound(number));
        }
        Snapshot::load(&path, true)
    }

    /// Number and content of the last state, if any
    pub fn last_state(&self) -> Result<Option<(usize, Snapshot)>> {
        match self.state_count() {
            0 => Ok(None),
            n => Ok(Some((n, self.load_state(n)?))),
        }
    }

    fn scanner(&self, options: ScanOptions) -> Scanner {
        Scanner::new(self.root.clone(), options)
    }

    /// Canonicalize `dir` and check that it lies inside the repository
    fn resolve_dir(&self, dir: &Path) -> Result<PathBuf> {
        let absolute = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root.join(dir)
        };
        let canonical = canonical_dir(&absolute)?;
        relative_name(&canonical, &self.root)?;
        if canonical.starts_with(&self.metadata_dir) {
            return Err(TreesealError::InvalidPath(dir.to_path_buf()));
        }
        Ok(canonical)
    }

    /// Scan the whole tree and save it as a new state
    pub fn commit(&self, comment: &str) -> Result<CommitOutcome> {
        self.commit_dir(&self.root, comment)
    }

    /// Scan `dir` and save a new state
    ///
    /// Records outside `dir` are carried over unchanged from the last state.
    /// No state is written when a previous state exists and nothing changed.
    pub fn commit_dir(&self, dir: &Path, comment: &str) -> Result<CommitOutcome> {
        let dir = self.resolve_dir(dir)?;
        let (mut current, stats) = self.scanner(self.options.clone()).scan_dir(comment, &dir)?;
        let last = self.last_state()?;

        let result = match &last {
            Some((_, previous)) if dir != self.root => {
                let inside = previous.filter_to_subtree(&self.root, &dir, true)?;
                let outside = previous.filter_to_subtree(&self.root, &dir, false)?;
                let result = compare(&inside, &current, self.compare_mode);

                let prefix = format!("{}/", relative_name(&dir, &self.root)?);
                current.file_states.extend(outside.file_states);
                current.ignored_files.extend(
                    previous
                        .ignored_files
                        .iter()
                        .filter(|name| !name.starts_with(&prefix))
                        .cloned(),
                );
                result
            }
            Some((_, previous)) => compare(previous, &current, self.compare_mode),
            None => {
                let empty = Snapshot::new("", current.hash_mode, Vec::new(), BTreeSet::new());
                compare(&empty, &current, self.compare_mode)
            }
        };

        if last.is_some() && !result.something_modified() {
            info!("Nothing modified, no state saved");
            return Ok(CommitOutcome {
                state_number: None,
                result,
                stats,
            });
        }

        let number = self.state_count() + 1;
        current.modification_counts = result.modification_counts();
        current.save(&self.state_path(number))?;
        info!("Saved state {} with {} files", number, current.file_count);

        Ok(CommitOutcome {
            state_number: Some(number),
            result,
            stats,
        })
    }

    /// Compare the tree against the last state
    pub fn diff(&self) -> Result<DiffOutcome> {
        self.diff_dir(&self.root)
    }

    /// Compare `dir` against the matching part of the last state
    ///
    /// # Errors
    ///
    /// [`TreesealError::NoCommittedState`] if nothing was committed yet.
    pub fn diff_dir(&self, dir: &Path) -> Result<DiffOutcome> {
        let dir = self.resolve_dir(dir)?;
        let (state_number, last) = self.last_state()?.ok_or(TreesealError::NoCommittedState)?;
        let previous = if dir == self.root {
            last
        } else {
            last.filter_to_subtree(&self.root, &dir, true)?
        };

        let (current, stats) = self.scanner(self.options.clone()).scan_dir("", &dir)?;
        let result = compare(&previous, &current, self.compare_mode);
        Ok(DiffOutcome {
            state_number,
            result,
            stats,
        })
    }

    /// Scan the tree and group files with identical content
    ///
    /// An attributes-only hash mode cannot find duplicates and is replaced by
    /// full-content hashing for this scan.
    pub fn find_duplicates(&self) -> Result<DuplicateReport> {
        let mut options = self.options.clone();
        if !options.hash_mode.reads_content() {
            debug!("Hashing full content to find duplicates");
            options.hash_mode = HashMode::HashAll;
        }
        let (snapshot, _) = self.scanner(options).scan("")?;
        Ok(find_duplicates(&snapshot))
    }

    /// Summaries of every committed state, oldest first
    ///
    /// States are read without integrity verification.
    pub fn log(&self) -> Result<Vec<LogEntry>> {
        (1..=self.state_count())
            .map(|number| {
                let state = Snapshot::load(&self.state_path(number), false)?;
                Ok(LogEntry {
                    state_number: number,
                    timestamp: state.timestamp,
                    comment: state.comment,
                    file_count: state.file_count,
                    files_content_length: state.files_content_length,
                    hash_mode: state.hash_mode,
                    modification_counts: state.modification_counts,
                })
            })
            .collect()
    }

    /// Restore recorded modification times of files whose content is unchanged
    ///
    /// Content is always checked by fingerprint, whatever the configured
    /// compare mode: the tree is rescanned with the last state's hash mode
    /// (full content when that state has no fingerprints) and only files whose
    /// fingerprint matches the recorded one are reset. Returns the paths that
    /// were reset. A file whose time cannot be set is logged and skipped.
    pub fn reset_dates(&self) -> Result<Vec<String>> {
        let (_, previous) = self.last_state()?.ok_or(TreesealError::NoCommittedState)?;
        let mut options = self.options.clone();
        options.hash_mode = if previous.hash_mode.reads_content() {
            previous.hash_mode
        } else {
            HashMode::HashAll
        };
        let (current, _) = self.scanner(options).scan("")?;
        let result = compare(&previous, &current, CompareMode::Full);

        let mut reset = Vec::new();
        for name in &result.date_modified {
            let (Some(record), Some(now)) = (previous.get(name), current.get(name)) else {
                continue;
            };
            if !record.fingerprints_comparable(now) {
                warn!("Cannot verify the content of {}, date left unchanged", name);
                continue;
            }
            let millis = record.last_modified;
            let mtime = FileTime::from_unix_time(
                millis.div_euclid(1000),
                (millis.rem_euclid(1000) * 1_000_000) as u32,
            );
            match filetime::set_file_mtime(self.root.join(name), mtime) {
                Ok(()) => reset.push(name.clone()),
                Err(e) => warn!("Cannot reset date of {}: {}", name, e),
            }
        }

        info!("Reset the modification date of {} files", reset.len());
        Ok(reset)
    }
}

//! # treeseal - Tamper-evident directory snapshots
//!
//! treeseal records the state of a directory tree (paths, sizes, modification
//! times and content fingerprints) and later tells you exactly what changed.
//! It is an integrity auditor: it notices corruption, unexpected edits and
//! silent bit-rot independently of any version-control system.
//!
//! ## Overview
//!
//! - **Scan** a tree into a [`Snapshot`] with a pool of hashing workers
//! - **Persist** snapshots as gzip JSON protected by a SHA-512 state hash
//! - **Compare** two snapshots into added, deleted, content-modified and
//!   date-modified files
//! - **Find duplicates** among the files of one snapshot
//!
//! treeseal never copies or restores content. It is not a backup tool, has no
//! branches or merges, and does not watch the filesystem: every snapshot is a
//! point-in-time scan.
//!
//! ## Architecture
//!
//! - [`ignore_rules`]: per-directory `.treesealignore` files and reserved names
//! - [`scanner`]: depth-first walk feeding a bounded queue drained by a fixed
//!   rayon pool
//! - [`hashing`]: the four [`HashMode`]s, from attributes only to full content
//! - [`progress`]: progress markers shared by all workers
//! - [`snapshot`]: the snapshot model, its integrity hash and its file format
//! - [`comparator`] and [`duplicates`]: pure functions over snapshots
//! - [`repository`]: numbered states under `.treeseal/` and the user-level
//!   operations built on the pieces above
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use treeseal::{HashMode, Repository, RepositoryBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = RepositoryBuilder::new()
//!     .hash_mode(HashMode::HashAll)
//!     .init("./photos")?;
//! repo.commit("after import")?;
//!
//! // later
//! let repo = Repository::open("./photos")?;
//! let outcome = repo.diff()?;
//! for (modification, file) in outcome.result.iter() {
//!     println!("{:>16}: {}", modification, file);
//! }
//! # Ok(())
//! # }
//! ```

pub mod comparator;
pub mod duplicates;
pub mod error;
pub mod hashing;
pub mod ignore_rules;
pub mod progress;
pub mod repository;
pub mod scanner;
pub mod snapshot;
pub mod types;
pub mod utils;

pub use comparator::{compare, CompareMode, CompareResult};
pub use duplicates::{find_duplicates, DuplicateGroup, DuplicateReport};
pub use error::{Result, TreesealError};
pub use hashing::HashMode;
pub use ignore_rules::IgnoreRules;
pub use progress::ProgressReporter;
pub use repository::{CommitOutcome, DiffOutcome, Repository, RepositoryBuilder};
pub use scanner::{ScanOptions, Scanner};
pub use snapshot::Snapshot;
pub use types::*;

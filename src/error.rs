//! Error types for the treeseal library
//!
//! Every fallible operation in the crate returns [`Result`]. Errors carry the
//! path and underlying cause so callers can report something actionable.
//! Faults that only affect a single directory or file during a scan are not
//! surfaced here at all: they are logged and the scan moves on.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Type alias for Results in the treeseal library
pub type Result<T> = std::result::Result<T, TreesealError>;

/// Main error type for all treeseal operations
#[derive(Debug, Error)]
pub enum TreesealError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored integrity hash does not match the recomputed one
    #[error("Snapshot {path:?} is corrupted - expected state hash {expected}, computed {actual}")]
    CorruptedSnapshot {
        /// Snapshot file that failed verification
        path: PathBuf,
        /// Hash stored in the file
        expected: String,
        /// Hash recomputed from the loaded content
        actual: String,
    },

    /// Snapshot file could not be decompressed or parsed
    #[error("Malformed snapshot {path:?}: {reason}")]
    MalformedSnapshot {
        /// Snapshot file that could not be decoded
        path: PathBuf,
        /// Decoder error
        reason: String,
    },

    /// The work queue stayed full for longer than the enqueue timeout
    #[error("Timed out after {timeout:?} queueing {path:?} for hashing")]
    QueueTimeout {
        /// File that could not be queued
        path: PathBuf,
        /// Configured enqueue timeout
        timeout: Duration,
    },

    /// Repository is not initialized
    #[error("Repository not initialized at path: {0:?}")]
    RepositoryNotInitialized(PathBuf),

    /// Repository already exists
    #[error("Repository already exists at path: {0:?}")]
    RepositoryAlreadyExists(PathBuf),

    /// No hashing worker finished a file within the timeout after the walk
    #[error("No file hashed within {timeout:?}")]
    HashingTimeout {
        /// Configured timeout
        timeout: Duration,
    },

    /// Requested state number does not exist
    #[error("State not found: {0}")]
    StateNotFound(usize),

    /// An operation needs a previous state but none was committed
    #[error("No state committed yet")]
    NoCommittedState,

    /// Path is outside the repository or otherwise unusable
    #[error("Invalid path: {0:?}")]
    InvalidPath(PathBuf),

    /// Thread pool error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TreesealError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        TreesealError::Internal(msg.into())
    }

    /// Create a malformed snapshot error for `path`
    pub fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TreesealError::MalformedSnapshot {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TreesealError::QueueTimeout { .. }
                | TreesealError::HashingTimeout { .. }
                | TreesealError::NoCommittedState
        )
    }

    /// Check if this error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            TreesealError::CorruptedSnapshot { .. } | TreesealError::MalformedSnapshot { .. }
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            TreesealError::RepositoryNotInitialized(path) => {
                format!(
                    "No repository found at {:?}. Run 'treeseal init' first.",
                    path
                )
            }
            TreesealError::NoCommittedState => {
                "Nothing to compare against. Run 'treeseal commit' to record a first state."
                    .to_string()
            }
            TreesealError::CorruptedSnapshot { path, .. } => {
                format!(
                    "State file {:?} was modified after it was written. \
                     Its content can no longer be trusted.",
                    path
                )
            }
            TreesealError::QueueTimeout { timeout, .. }
            | TreesealError::HashingTimeout { timeout } => {
                format!(
                    "Hashing made no progress for {}. The disk may be stalled; try again \
                     with fewer threads.",
                    humantime::format_duration(*timeout)
                )
            }
            _ => self.to_string(),
        }
    }
}

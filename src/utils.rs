//! Utility functions for treeseal
//!
//! Small helpers shared by the scanner, the snapshot store and the repository.
//!
//! ## Categories of Utilities
//!
//! ### Path Manipulation
//! - Converting absolute paths to repository-relative paths
//! - Slash-normalizing relative paths so snapshots compare across platforms
//!
//! ### File Operations
//! - Atomic file writing
//! - Modification times as epoch milliseconds
//!
//! ### Data Processing
//! - Byte formatting (human-readable sizes)

use crate::error::{Result, TreesealError};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Convert an absolute path to a path relative to `base`
///
/// A lexical strip is tried first so symlinks keep their own path. When that
/// fails (for instance because one side contains `..`), both paths are
/// canonicalized and stripped again.
///
/// # Arguments
///
/// * `path` - Path to convert
/// * `base` - Directory the result should be relative to
///
/// # Returns
///
/// The relative path, or an error when `path` is not under `base`.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| TreesealError::InvalidPath(path.to_path_buf()))
}

/// Join the normal components of a relative path with `/`
///
/// `Path::new("a/b/c.txt")` becomes `"a/b/c.txt"` on every platform. An empty
/// path (the base itself) yields an empty string.
pub fn to_slash_string(relative: &Path) -> String {
    let mut out = String::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&part.to_string_lossy());
        }
    }
    out
}

/// Repository-relative, slash-normalized name of `path`
pub fn relative_name(path: &Path, base: &Path) -> Result<String> {
    Ok(to_slash_string(&make_relative(path, base)?))
}

/// Milliseconds since the Unix epoch, negative for times before it
pub fn system_time_to_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    }
}

/// Format bytes as human-readable string
///
/// Uses binary units. Values under 1024 are shown as whole bytes, anything
/// larger with two decimals.
///
/// # Example
///
/// ```rust,ignore
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Atomic file write (write to temp file then rename)
///
/// The target is never observed half written: readers see either the old
/// content or the new one.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

//! Content fingerprinting
//!
//! A [`HashMode`] decides how much of a file is read to build its fingerprint.
//! Sampling modes read one fixed block at a fixed offset, trading detection
//! accuracy for speed on large files. Only [`HashMode::HashAll`] is guaranteed
//! to notice every changed byte.
//!
//! ## Sampling window
//!
//! For a file longer than the mode's offset the window is
//! `[offset, min(len, offset + block))`. A file no longer than the offset is
//! hashed from byte 0 to its end. Since offset and block size are equal for
//! both sampling modes, small files are therefore hashed in full.
//!
//! Fingerprints are SHA-512 digests encoded as lowercase hex.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Size of the block read by [`HashMode::HashSmallBlock`], also its offset
pub const SMALL_BLOCK_SIZE: u64 = 4 * 1024;

/// Size of the block read by [`HashMode::HashMediumBlock`], also its offset
pub const MEDIUM_BLOCK_SIZE: u64 = 1024 * 1024;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// How file content is sampled when fingerprinting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum HashMode {
    /// Attributes only, no content is read
    DontHash,
    /// Second 4 KiB block
    HashSmallBlock,
    /// Second 1 MiB block
    HashMediumBlock,
    /// Entire file
    #[default]
    HashAll,
}

/// Result of fingerprinting one file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fingerprint {
    /// Hex digest, `None` when the mode does not read content
    pub hash: Option<String>,
    /// Bytes actually read to compute the digest
    pub bytes_read: u64,
}

impl HashMode {
    /// Every mode, from cheapest to most thorough
    pub const ALL: [HashMode; 4] = [
        HashMode::DontHash,
        HashMode::HashSmallBlock,
        HashMode::HashMediumBlock,
        HashMode::HashAll,
    ];

    /// Stable name used in persisted snapshots and the integrity hash
    pub fn name(&self) -> &'static str {
        match self {
            HashMode::DontHash => "dontHash",
            HashMode::HashSmallBlock => "hashSmallBlock",
            HashMode::HashMediumBlock => "hashMediumBlock",
            HashMode::HashAll => "hashAll",
        }
    }

    /// Whether fingerprinting in this mode reads file content
    pub fn reads_content(&self) -> bool {
        !matches!(self, HashMode::DontHash)
    }

    /// Human description of what is hashed
    pub fn description(&self) -> &'static str {
        match self {
            HashMode::DontHash => "file attributes only",
            HashMode::HashSmallBlock => "second 4 KB block",
            HashMode::HashMediumBlock => "second 1 MB block",
            HashMode::HashAll => "complete file content",
        }
    }

    /// Fingerprint the file at `path`, whose length is `len`
    ///
    /// # Errors
    ///
    /// Any I/O error opening, seeking or reading the file.
    pub fn fingerprint(&self, path: &Path, len: u64) -> io::Result<Fingerprint> {
        match self {
            HashMode::DontHash => Ok(Fingerprint::default()),
            HashMode::HashSmallBlock => hash_block(path, len, SMALL_BLOCK_SIZE),
            HashMode::HashMediumBlock => hash_block(path, len, MEDIUM_BLOCK_SIZE),
            HashMode::HashAll => hash_all(path),
        }
    }
}

impl fmt::Display for HashMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Byte range `(start, count)` sampled from a file of `len` bytes
pub fn sample_window(len: u64, block: u64) -> (u64, u64) {
    if len > block {
        (block, (len - block).min(block))
    } else {
        (0, len)
    }
}

fn hash_block(path: &Path, len: u64, block: u64) -> io::Result<Fingerprint> {
    let (start, count) = sample_window(len, block);
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    digest_reader(file.take(count))
}

fn hash_all(path: &Path) -> io::Result<Fingerprint> {
    digest_reader(File::open(path)?)
}

/// SHA-512 of everything `reader` yields
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<Fingerprint> {
    let mut hasher = Sha512::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        total += n as u64;
    }

    Ok(Fingerprint {
        hash: Some(hex::encode(hasher.finalize())),
        bytes_read: total,
    })
}

/// SHA-512 of an in-memory buffer, hex encoded
pub fn hash_data(data: &[u8]) -> String {
    hex::encode(Sha512::digest(data))
}

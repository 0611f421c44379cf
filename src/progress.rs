//! Scan progress markers
//!
//! Hashing workers report every finished file to one shared
//! [`ProgressReporter`]. Each batch of [`FILES_PER_MARKER`] files prints one
//! character whose shape encodes how much content the batch represented, and
//! a line break follows every [`FILES_PER_LINE`] files. Output is cosmetic and
//! never influences the resulting snapshot.

use crate::hashing::HashMode;
use parking_lot::Mutex;
use std::io::{self, Write};

/// Files summarized by one marker character
pub const FILES_PER_MARKER: usize = 10;

/// Files per output line
pub const FILES_PER_LINE: usize = 1000;

const MB: u64 = 1024 * 1024;

/// Size buckets, coarsest first
const BUCKETS: &[(u64, char)] = &[
    (200 * MB, '#'),
    (100 * MB, '@'),
    (50 * MB, 'O'),
    (20 * MB, 'o'),
    (0, '.'),
];

/// Marker for a batch whose files summed to `batch_len` bytes
pub fn progress_char(batch_len: u64) -> char {
    BUCKETS
        .iter()
        .find(|(threshold, _)| batch_len >= *threshold)
        .map(|(_, c)| *c)
        .unwrap_or('.')
}

struct ProgressState {
    file_count: usize,
    batch_len: u64,
    markers_written: bool,
    writer: Box<dyn Write + Send>,
}

/// Mutex-guarded counters shared by all hashing workers
pub struct ProgressReporter {
    enabled: bool,
    state: Mutex<ProgressState>,
}

impl ProgressReporter {
    /// Reporter writing to stderr
    ///
    /// Markers are only printed when `verbose` is set and `hash_mode` reads
    /// file content.
    pub fn new(verbose: bool, hash_mode: HashMode) -> Self {
        Self::with_writer(verbose, hash_mode, Box::new(io::stderr()))
    }

    /// Reporter writing to an arbitrary sink
    pub fn with_writer(verbose: bool, hash_mode: HashMode, writer: Box<dyn Write + Send>) -> Self {
        Self {
            enabled: verbose && hash_mode.reads_content(),
            state: Mutex::new(ProgressState {
                file_count: 0,
                batch_len: 0,
                markers_written: false,
                writer,
            }),
        }
    }

    /// Whether markers are printed
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Print the marker legend
    pub fn legend(&self) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.lock();
        let mut line = format!("Each char is {} files:", FILES_PER_MARKER);
        for (threshold, c) in BUCKETS.iter().rev() {
            if *threshold == 0 {
                line.push_str(&format!(" '{}' < {} MB,", c, 20));
            } else {
                line.push_str(&format!(" '{}' >= {} MB,", c, threshold / MB));
            }
        }
        line.pop();
        let _ = writeln!(state.writer, "{}", line);
    }

    /// Account for one hashed file of `file_len` bytes
    pub fn record(&self, file_len: u64) {
        let mut state = self.state.lock();
        state.file_count += 1;
        state.batch_len += file_len;

        if !self.enabled {
            return;
        }
        if state.file_count % FILES_PER_MARKER == 0 {
            let c = progress_char(state.batch_len);
            state.batch_len = 0;
            state.markers_written = true;
            let _ = write!(state.writer, "{}", c);
            if state.file_count % FILES_PER_LINE == 0 {
                let _ = writeln!(state.writer);
            }
            let _ = state.writer.flush();
        }
    }

    /// Files reported so far
    pub fn file_count(&self) -> usize {
        self.state.lock().file_count
    }

    /// Terminate a partial marker line
    pub fn finish(&self) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.lock();
        if state.markers_written && state.file_count % FILES_PER_LINE != 0 {
            let _ = writeln!(state.writer);
        }
        let _ = state.writer.flush();
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("enabled", &self.enabled)
            .field("file_count", &self.file_count())
            .finish()
    }
}

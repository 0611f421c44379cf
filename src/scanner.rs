//! Directory scanning and concurrent fingerprinting
//!
//! A scan turns a live directory tree into a [`Snapshot`]. It is a single
//! producer feeding a fixed pool of hashing workers through one bounded queue:
//!
//! ```text
//!   walker (calling thread) --> bounded queue --> N hashing workers
//!                                                   |
//!                                  per-worker record lists, merged and sorted
//! ```
//!
//! ## Walking
//!
//! The tree is walked depth first without following symlinks. Before an entry
//! is visited, the `.treesealignore` rules of its parent directory are
//! consulted (see [`crate::ignore_rules`]). Ignored entries are recorded in the
//! snapshot and ignored directories are not descended. Regular files are
//! queued; sockets, devices and symlinks are skipped. A directory that cannot
//! be read is logged and skipped while the rest of the walk continues.
//!
//! ## Workers
//!
//! Workers run on a dedicated rayon pool. They are started lazily once the
//! queue holds more than half its capacity, so small trees finish the walk
//! before any hashing thread is spawned. If the walk ends first the pool is
//! started then. Each hashed file is sent back over a channel. A file that
//! vanishes or cannot be read while hashing is logged and left out of the
//! snapshot.
//!
//! Queueing blocks while the queue is full. If no worker frees a slot within
//! the configured timeout the scan fails with
//! [`TreesealError::QueueTimeout`]. Once the walk is over, the same timeout
//! bounds the wait for each hashed file, failing with
//! [`TreesealError::HashingTimeout`]. Workers are never joined, so a stalled
//! worker cannot hold the scan.
//!
//! ## Example
//!
//! ```rust,ignore
//! use treeseal::scanner::{ScanOptions, Scanner};
//! use treeseal::HashMode;
//!
//! let scanner = Scanner::new(root, ScanOptions::default().with_hash_mode(HashMode::HashSmallBlock));
//! let (snapshot, stats) = scanner.scan("weekly audit")?;
//! println!("{} files", stats.file_count);
//! ```

use crate::error::{Result, TreesealError};
use crate::hashing::HashMode;
use crate::ignore_rules::IgnoreRules;
use crate::progress::ProgressReporter;
use crate::snapshot::Snapshot;
use crate::types::{FileRecord, ScanStats};
use crate::utils::{format_bytes, relative_name, system_time_to_millis};
use chrono::Utc;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Default capacity of the work queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

/// Default time an enqueue may block before the scan fails
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(120 * 60);

/// Scan configuration
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How file content is fingerprinted
    pub hash_mode: HashMode,
    /// Number of hashing workers
    pub thread_count: usize,
    /// Print progress markers
    pub verbose: bool,
    /// Capacity of the bounded work queue
    pub queue_capacity: usize,
    /// Longest time an enqueue may block
    pub enqueue_timeout: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            hash_mode: HashMode::default(),
            thread_count: num_cpus::get(),
            verbose: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            enqueue_timeout: DEFAULT_ENQUEUE_TIMEOUT,
        }
    }
}

impl ScanOptions {
    /// Set the hash mode
    pub fn with_hash_mode(mut self, hash_mode: HashMode) -> Self {
        self.hash_mode = hash_mode;
        self
    }

    /// Set the number of hashing workers (at least one is always used)
    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count.max(1);
        self
    }

    /// Enable progress markers
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the work queue capacity (at least one slot)
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set how long an enqueue may block
    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }
}

/// One hashed file, sent by a worker as soon as it is done
struct Hashed {
    record: FileRecord,
    bytes_read: u64,
}

/// State shared by the hashing workers
struct HashContext {
    root: PathBuf,
    hash_mode: HashMode,
    progress: Arc<ProgressReporter>,
}

impl HashContext {
    fn run_worker(&self, id: usize, queue: Receiver<PathBuf>, results: Sender<Hashed>) {
        let mut hashed = 0usize;

        for path in queue.iter() {
            match self.hash_file(&path) {
                Ok(done) => {
                    self.progress.record(done.record.file_length);
                    hashed += 1;
                    if results.send(done).is_err() {
                        // the scan gave up, nobody collects any more
                        break;
                    }
                }
                Err(e) => warn!("Skipping {:?}: {}", path, e),
            }
        }

        trace!("Hasher {} done after {} files", id, hashed);
    }

    fn hash_file(&self, path: &Path) -> Result<Hashed> {
        let metadata = fs::symlink_metadata(path)?;
        let file_length = metadata.len();
        let last_modified = system_time_to_millis(metadata.modified()?);
        let fingerprint = self.hash_mode.fingerprint(path, file_length)?;

        let record = FileRecord {
            file_name: relative_name(path, &self.root)?,
            file_length,
            last_modified,
            hash: fingerprint.hash,
            hash_mode: self.hash_mode,
        };
        Ok(Hashed {
            record,
            bytes_read: fingerprint.bytes_read,
        })
    }
}

/// Handle on the not-yet-started hashing workers
///
/// Workers are detached pool jobs and are never joined.
struct WorkerPool<'p> {
    pool: &'p ThreadPool,
    context: Arc<HashContext>,
    queue: Receiver<PathBuf>,
    results: Sender<Hashed>,
    thread_count: usize,
    started: bool,
}

impl WorkerPool<'_> {
    /// Spawn the workers, once
    fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        debug!("Starting {} hashing workers", self.thread_count);

        for id in 0..self.thread_count {
            let queue = self.queue.clone();
            let results = self.results.clone();
            let context = Arc::clone(&self.context);
            self.pool.spawn(move || context.run_worker(id, queue, results));
        }
    }
}

/// Scans one repository root
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    options: ScanOptions,
}

impl Scanner {
    /// Create a scanner for `root`
    ///
    /// Record paths are relative to `root`.
    pub fn new(root: impl Into<PathBuf>, options: ScanOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    /// Repository root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Active options
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan the whole tree
    pub fn scan(&self, comment: &str) -> Result<(Snapshot, ScanStats)> {
        self.scan_dir(comment, &self.root)
    }

    /// Scan the subtree rooted at `dir`, which must lie under the root
    ///
    /// The snapshot is stamped with the time the scan started.
    ///
    /// # Errors
    ///
    /// - [`TreesealError::InvalidPath`] if `dir` is outside the root
    /// - [`TreesealError::QueueTimeout`] if the queue stayed full too long
    /// - [`TreesealError::HashingTimeout`] if no queued file finished hashing
    ///   within the enqueue timeout once the walk was over
    /// - [`TreesealError::ThreadPool`] if the worker pool cannot be built
    pub fn scan_dir(&self, comment: &str, dir: &Path) -> Result<(Snapshot, ScanStats)> {
        relative_name(dir, &self.root)?;
        let started_at = Utc::now();
        let start = Instant::now();
        let thread_count = self.options.thread_count.max(1);
        let capacity = self.options.queue_capacity.max(1);
        let timeout = self.options.enqueue_timeout;

        let progress = Arc::new(ProgressReporter::new(self.options.verbose, self.options.hash_mode));
        progress.legend();

        let pool = ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .thread_name(|i| format!("treeseal-hasher-{}", i))
            .build()
            .map_err(|e| TreesealError::ThreadPool(e.to_string()))?;

        let (sender, receiver) = bounded::<PathBuf>(capacity);
        let (results_sender, results) = unbounded::<Hashed>();
        let mut workers = WorkerPool {
            pool: &pool,
            context: Arc::new(HashContext {
                root: self.root.clone(),
                hash_mode: self.options.hash_mode,
                progress: Arc::clone(&progress),
            }),
            queue: receiver,
            results: results_sender,
            thread_count,
            started: false,
        };

        let walked = self.walk(dir, &sender, capacity, &mut workers);
        workers.start();
        // closing the queue lets the workers drain it and exit; dropping the
        // handle leaves the workers as the only result senders
        drop(sender);
        drop(workers);
        let ignored_files = match walked {
            Ok(ignored) => ignored,
            Err(e) => {
                progress.finish();
                return Err(e);
            }
        };

        let mut stats = ScanStats {
            thread_count,
            ..ScanStats::default()
        };
        let mut records = Vec::new();
        loop {
            match results.recv_timeout(timeout) {
                Ok(hashed) => {
                    stats.content_bytes += hashed.record.file_length;
                    stats.bytes_hashed += hashed.bytes_read;
                    records.push(hashed.record);
                }
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    progress.finish();
                    warn!("No file hashed for {:?}, abandoning the scan", timeout);
                    return Err(TreesealError::HashingTimeout { timeout });
                }
            }
        }
        progress.finish();

        let mut snapshot = Snapshot::new(comment, self.options.hash_mode, records, ignored_files);
        snapshot.timestamp = started_at;
        stats.file_count = snapshot.file_count;
        stats.duration = start.elapsed();

        info!(
            "Scanned {} files ({}), hashed {} ({}/s), during {}, using {} thread{}",
            stats.file_count,
            format_bytes(stats.content_bytes),
            format_bytes(stats.bytes_hashed),
            format_bytes(stats.throughput()),
            humantime::format_duration(Duration::from_millis(stats.duration.as_millis() as u64)),
            thread_count,
            if thread_count == 1 { "" } else { "s" }
        );

        Ok((snapshot, stats))
    }

    /// Walk `dir`, queueing regular files, and return the ignored paths
    fn walk(
        &self,
        dir: &Path,
        sender: &Sender<PathBuf>,
        capacity: usize,
        workers: &mut WorkerPool<'_>,
    ) -> Result<BTreeSet<String>> {
        let mut ignored = BTreeSet::new();
        // rules of the directories on the current path, index = depth
        let mut rules_stack: Vec<(PathBuf, IgnoreRules)> = Vec::new();
        let root = &self.root;

        let walker = WalkDir::new(dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let depth = entry.depth();
                if depth == 0 {
                    return true;
                }
                let Some(parent) = entry.path().parent() else {
                    return true;
                };
                rules_stack.truncate(depth);
                let cached = rules_stack.len() == depth
                    && rules_stack.last().is_some_and(|(cached_dir, _)| cached_dir.as_path() == parent);
                if !cached {
                    rules_stack.truncate(depth - 1);
                    rules_stack.push((parent.to_path_buf(), IgnoreRules::load(parent)));
                }
                let Some((_, rules)) = rules_stack.last() else {
                    return true;
                };

                let is_dir = entry.file_type().is_dir();
                let name = entry.file_name().to_string_lossy();
                if !rules.is_ignored(&name, is_dir) {
                    return true;
                }

                let mut recorded = relative_name(entry.path(), root)
                    .unwrap_or_else(|_| entry.path().to_string_lossy().into_owned());
                if is_dir {
                    recorded.push('/');
                }
                trace!("Ignoring {}", recorded);
                ignored.insert(recorded);
                false
            });

        let timeout = self.options.enqueue_timeout;
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            if sender.len() > capacity / 2 {
                workers.start();
            }
            sender
                .send_timeout(entry.into_path(), timeout)
                .map_err(|e| match e {
                    SendTimeoutError::Timeout(path) => {
                        warn!("Queue stayed full for {:?}, giving up on {:?}", timeout, path);
                        TreesealError::QueueTimeout { path, timeout }
                    }
                    SendTimeoutError::Disconnected(path) => {
                        TreesealError::internal(format!("hashing workers exited before {:?} was queued", path))
                    }
                })?;
        }

        Ok(ignored)
    }
}

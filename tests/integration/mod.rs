//! Integration tests for treeseal
//!
//! Scenarios run against real directories: a small tree of four files is
//! scanned, mutated, then rescanned, and the comparison is checked for every
//! hash mode.

use ::treeseal::*;
use filetime::FileTime;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const BASE_MTIME: i64 = 1_600_000_000;

/// Creates file_01..file_04 with distinct content and a fixed mtime
fn setup_base(root: &Path) {
    for i in 1..=4 {
        let path = root.join(format!("file_{:02}", i));
        fs::write(&path, format!("content of file {}\n", i).repeat(50)).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(BASE_MTIME, 0)).unwrap();
    }
}

fn scan(root: &Path, mode: HashMode) -> Snapshot {
    let options = ScanOptions::default()
        .with_hash_mode(mode)
        .with_thread_count(3);
    Scanner::new(root, options).scan("").unwrap().0
}

/// Run `mutate` between two scans in every hash mode and return the results
fn run_scenario(mutate: impl Fn(&Path)) -> Vec<(HashMode, CompareResult)> {
    HashMode::ALL
        .iter()
        .map(|&mode| {
            let temp_dir = TempDir::new().unwrap();
            setup_base(temp_dir.path());
            let before = scan(temp_dir.path(), mode);
            mutate(temp_dir.path());
            let after = scan(temp_dir.path(), mode);
            (mode, compare(&before, &after, CompareMode::Full))
        })
        .collect()
}

fn touch(path: &Path) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(BASE_MTIME + 3600, 0)).unwrap();
}

fn append(path: &Path) {
    use std::io::Write;
    let mut file = fs::OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(b"appended\n").unwrap();
}

#[test]
fn test_nothing_modified() {
    for (mode, result) in run_scenario(|_| {}) {
        assert!(!result.something_modified(), "{}", mode);
    }
}

#[test]
fn test_add_file() {
    for (mode, result) in run_scenario(|root| fs::write(root.join("file_05"), "new").unwrap()) {
        assert_eq!(result.added, ["file_05"], "{}", mode);
        assert_eq!(result.modification_counts().total(), 1);
    }
}

#[test]
fn test_touch_file() {
    for (mode, result) in run_scenario(|root| touch(&root.join("file_01"))) {
        assert_eq!(result.date_modified, ["file_01"], "{}", mode);
        assert!(result.content_modified.is_empty());
    }
}

#[test]
fn test_append_to_file() {
    for (mode, result) in run_scenario(|root| append(&root.join("file_01"))) {
        assert_eq!(result.content_modified, ["file_01"], "{}", mode);
        assert!(result.date_modified.is_empty());
    }
}

#[test]
fn test_rename_file() {
    for (mode, result) in run_scenario(|root| {
        fs::rename(root.join("file_01"), root.join("file_06")).unwrap()
    }) {
        assert_eq!(result.added, ["file_06"], "{}", mode);
        assert_eq!(result.deleted, ["file_01"], "{}", mode);
    }
}

#[test]
fn test_copy_file() {
    for (mode, result) in run_scenario(|root| {
        fs::copy(root.join("file_01"), root.join("file_06")).unwrap();
    }) {
        assert_eq!(result.added, ["file_06"], "{}", mode);
        assert_eq!(result.modification_counts().total(), 1);
    }
}

#[test]
fn test_delete_file() {
    for (mode, result) in run_scenario(|root| fs::remove_file(root.join("file_01")).unwrap()) {
        assert_eq!(result.deleted, ["file_01"], "{}", mode);
        assert_eq!(result.modification_counts().total(), 1);
    }
}

#[test]
fn test_copy_then_touch() {
    for (mode, result) in run_scenario(|root| {
        fs::copy(root.join("file_01"), root.join("file_00")).unwrap();
        fs::copy(root.join("file_01"), root.join("file_06")).unwrap();
        touch(&root.join("file_01"));
    }) {
        assert_eq!(result.added, ["file_00", "file_06"], "{}", mode);
        assert_eq!(result.date_modified, ["file_01"], "{}", mode);
    }
}

#[test]
fn test_copy_then_append() {
    for (mode, result) in run_scenario(|root| {
        fs::copy(root.join("file_01"), root.join("file_00")).unwrap();
        fs::copy(root.join("file_01"), root.join("file_06")).unwrap();
        append(&root.join("file_01"));
    }) {
        assert_eq!(result.added, ["file_00", "file_06"], "{}", mode);
        assert_eq!(result.content_modified, ["file_01"], "{}", mode);
    }
}

#[test]
fn test_same_length_edit_needs_hashing() {
    for (mode, result) in run_scenario(|root| {
        let path = root.join("file_02");
        let mut data = fs::read(&path).unwrap();
        // files below one block are sampled whole in every hashing mode
        data[0] ^= 0x20;
        fs::write(&path, data).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(BASE_MTIME, 0)).unwrap();
    }) {
        if mode == HashMode::DontHash {
            assert!(!result.something_modified(), "{}", mode);
        } else {
            assert_eq!(result.content_modified, ["file_02"], "{}", mode);
        }
    }
}

#[test]
fn test_fast_compare_ignores_fingerprints() {
    let temp_dir = TempDir::new().unwrap();
    setup_base(temp_dir.path());
    let before = scan(temp_dir.path(), HashMode::HashAll);

    let path = temp_dir.path().join("file_03");
    let mut data = fs::read(&path).unwrap();
    data[10] ^= 0x01;
    fs::write(&path, data).unwrap();
    filetime::set_file_mtime(&path, FileTime::from_unix_time(BASE_MTIME, 0)).unwrap();
    let after = scan(temp_dir.path(), HashMode::HashAll);

    assert!(!compare(&before, &after, CompareMode::Fast).something_modified());
    assert_eq!(compare(&before, &after, CompareMode::Full).content_modified, ["file_03"]);
}

#[test]
fn test_many_files_start_workers_lazily() {
    let temp_dir = TempDir::new().unwrap();
    for d in 0..6 {
        let dir = temp_dir.path().join(format!("dir{}", d));
        fs::create_dir(&dir).unwrap();
        for f in 0..100 {
            fs::write(dir.join(format!("f{:03}", f)), format!("{}-{}", d, f)).unwrap();
        }
    }

    let options = ScanOptions::default()
        .with_thread_count(4)
        .with_queue_capacity(500);
    let (snapshot, stats) = Scanner::new(temp_dir.path(), options).scan("big").unwrap();
    assert_eq!(snapshot.file_count, 600);
    assert_eq!(stats.file_count, 600);
    assert_eq!(stats.thread_count, 4);
    assert!(snapshot.file_states.iter().all(|r| r.hash.is_some()));
    assert!(snapshot
        .file_states
        .windows(2)
        .all(|w| w[0].file_name < w[1].file_name));
}

#[test]
fn test_tiny_queue_still_completes() {
    let temp_dir = TempDir::new().unwrap();
    for f in 0..50 {
        fs::write(temp_dir.path().join(format!("f{:02}", f)), vec![f as u8; 100]).unwrap();
    }
    let options = ScanOptions::default()
        .with_thread_count(2)
        .with_queue_capacity(1);
    let (snapshot, _) = Scanner::new(temp_dir.path(), options).scan("").unwrap();
    assert_eq!(snapshot.file_count, 50);
    assert_eq!(snapshot.files_content_length, 5000);
}

#[test]
fn test_full_queue_times_out() {
    let temp_dir = TempDir::new().unwrap();
    for f in 0..2000 {
        fs::write(temp_dir.path().join(format!("f{:04}", f)), vec![0u8; 512]).unwrap();
    }
    let options = ScanOptions::default()
        .with_hash_mode(HashMode::HashAll)
        .with_thread_count(1)
        .with_queue_capacity(1)
        .with_enqueue_timeout(Duration::ZERO);

    let err = Scanner::new(temp_dir.path(), options).scan("").unwrap_err();
    match err {
        TreesealError::QueueTimeout { path, timeout } => {
            assert!(path.starts_with(temp_dir.path()));
            assert_eq!(timeout, Duration::ZERO);
        }
        other => panic!("expected a queue timeout, got {}", other),
    }
}

#[test]
fn test_ignore_rules_across_directories() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("src/target")).unwrap();
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::write(root.join(".treesealignore"), "*.log\n").unwrap();
    fs::write(root.join("src/.treesealignore"), "target\n").unwrap();
    fs::write(root.join("app.log"), "log").unwrap();
    fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
    fs::write(root.join("src/target/out.bin"), "bin").unwrap();
    fs::write(root.join("docs/target"), "a file named target").unwrap();
    fs::create_dir_all(root.join(".git")).unwrap();
    fs::write(root.join(".git/HEAD"), "ref").unwrap();

    let (snapshot, _) = Scanner::new(root, ScanOptions::default()).scan("").unwrap();
    let names: Vec<_> = snapshot.file_states.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(
        names,
        [".treesealignore", "docs/target", "src/.treesealignore", "src/main.rs"]
    );
    assert!(snapshot.ignored_files.contains("app.log"));
    assert!(snapshot.ignored_files.contains("src/target/"));
    assert!(snapshot.ignored_files.contains(".git/"));
    assert!(!snapshot.file_states.iter().any(|r| r.file_name.starts_with(".git")));
}

#[test]
fn test_repository_state_files_are_not_scanned() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("data"), "x").unwrap();
    let repo = RepositoryBuilder::new().init(temp_dir.path()).unwrap();
    repo.commit("one").unwrap();
    fs::write(temp_dir.path().join("more"), "y").unwrap();
    repo.commit("two").unwrap();

    let last = repo.load_state(2).unwrap();
    let names: Vec<_> = last.file_states.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, ["data", "more"]);
}

#[test]
fn test_subdirectory_diff_and_commit() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("photos")).unwrap();
    fs::create_dir_all(root.join("music")).unwrap();
    fs::write(root.join("photos/a.jpg"), "a").unwrap();
    fs::write(root.join("music/b.mp3"), "b").unwrap();

    let repo = RepositoryBuilder::new().thread_count(2).init(root).unwrap();
    repo.commit("initial").unwrap();

    fs::write(root.join("photos/c.jpg"), "c").unwrap();
    fs::remove_file(root.join("music/b.mp3")).unwrap();

    // changes outside the subdirectory are invisible
    let diff = repo.diff_dir(Path::new("photos")).unwrap();
    assert_eq!(diff.result.added, ["photos/c.jpg"]);
    assert!(diff.result.deleted.is_empty());

    let outcome = repo.commit_dir(&root.join("photos"), "photos only").unwrap();
    assert_eq!(outcome.state_number, Some(2));

    // outside records carried over from the previous state
    let state = repo.load_state(2).unwrap();
    let names: Vec<_> = state.file_states.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, ["music/b.mp3", "photos/a.jpg", "photos/c.jpg"]);

    let full = repo.diff().unwrap();
    assert_eq!(full.result.deleted, ["music/b.mp3"]);
    assert!(full.result.added.is_empty());
}

#[test]
fn test_subdirectory_outside_root_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    let repo = RepositoryBuilder::new().init(temp_dir.path()).unwrap();
    repo.commit("").unwrap();
    let err = repo.diff_dir(other.path()).unwrap_err();
    assert!(matches!(err, TreesealError::InvalidPath(_)));
}

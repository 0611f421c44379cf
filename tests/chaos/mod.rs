//! Chaos tests for treeseal
//!
//! These tests damage persisted snapshots and the scanned tree in various ways
//! and check that every fault is either detected or survived.

use ::treeseal::*;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Repository with a handful of files and one committed state
fn committed_repo() -> (TempDir, Repository) {
    let temp_dir = TempDir::new().unwrap();
    for i in 0..20 {
        fs::write(
            temp_dir.path().join(format!("file_{:02}.dat", i)),
            format!("payload {}", i).repeat(i + 1),
        )
        .unwrap();
    }
    let repo = RepositoryBuilder::new()
        .thread_count(2)
        .init(temp_dir.path())
        .unwrap();
    repo.commit("baseline").unwrap();
    (temp_dir, repo)
}

fn read_json(path: &Path) -> serde_json::Value {
    let mut text = String::new();
    GzDecoder::new(fs::File::open(path).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    serde_json::from_str(&text).unwrap()
}

fn write_json(path: &Path, value: &serde_json::Value) {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(serde_json::to_string_pretty(value).unwrap().as_bytes())
        .unwrap();
    fs::write(path, encoder.finish().unwrap()).unwrap();
}

fn state_file(repo: &Repository) -> PathBuf {
    repo.state_path(1)
}

#[test]
fn test_tampered_file_length_is_corruption() {
    let (_dir, repo) = committed_repo();
    let path = state_file(&repo);

    let mut json = read_json(&path);
    let length = json["fileStates"][3]["fileLength"].as_u64().unwrap();
    json["fileStates"][3]["fileLength"] = serde_json::json!(length + 1);
    write_json(&path, &json);

    let err = Snapshot::load(&path, true).unwrap_err();
    assert!(matches!(err, TreesealError::CorruptedSnapshot { .. }));
    assert!(err.is_corruption());
    assert!(!err.is_recoverable());

    // unverified loads still succeed
    assert!(Snapshot::load(&path, false).is_ok());
}

#[test]
fn test_tampered_fields_are_all_detected() {
    let (_dir, repo) = committed_repo();
    let path = state_file(&repo);
    let original = read_json(&path);

    let edits: Vec<Box<dyn Fn(&mut serde_json::Value)>> = vec![
        Box::new(|j| j["comment"] = serde_json::json!("rewritten")),
        Box::new(|j| j["hashMode"] = serde_json::json!("dontHash")),
        Box::new(|j| j["fileStates"][0]["fileName"] = serde_json::json!("renamed.dat")),
        Box::new(|j| j["fileStates"][5]["lastModified"] = serde_json::json!(0)),
        Box::new(|j| j["fileStates"][7]["hash"] = serde_json::json!("00")),
        Box::new(|j| j["ignoredFiles"] = serde_json::json!(["sneaky/"])),
        Box::new(|j| j["timestamp"] = serde_json::json!("2001-01-01T00:00:00Z")),
        Box::new(|j| {
            j["fileStates"].as_array_mut().unwrap().pop();
        }),
    ];

    for (i, edit) in edits.iter().enumerate() {
        let mut json = original.clone();
        edit(&mut json);
        write_json(&path, &json);
        let err = Snapshot::load(&path, true).unwrap_err();
        assert!(
            matches!(err, TreesealError::CorruptedSnapshot { .. }),
            "edit {} not detected: {}",
            i,
            err
        );
    }
}

#[test]
fn test_modification_counts_are_not_protected() {
    let (_dir, repo) = committed_repo();
    let path = state_file(&repo);

    let mut json = read_json(&path);
    json["modificationCounts"]["added"] = serde_json::json!(12345);
    write_json(&path, &json);

    let loaded = Snapshot::load(&path, true).unwrap();
    assert_eq!(loaded.modification_counts.added, 12345);
}

#[test]
fn test_random_byte_flips_never_load_silently() {
    let (_dir, repo) = committed_repo();
    let path = state_file(&repo);
    let pristine = fs::read(&path).unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    // gzip header bytes 0..10 are not covered by the trailer checksum
    for _ in 0..40 {
        let mut bytes = pristine.clone();
        let index = rng.random_range(10..bytes.len());
        bytes[index] ^= 1 << rng.random_range(0..8);
        fs::write(&path, &bytes).unwrap();

        let err = Snapshot::load(&path, true).unwrap_err();
        assert!(err.is_corruption(), "flip at {} gave {}", index, err);
    }
}

#[test]
fn test_truncated_snapshot_is_malformed() {
    let (_dir, repo) = committed_repo();
    let path = state_file(&repo);
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let err = Snapshot::load(&path, true).unwrap_err();
    assert!(matches!(err, TreesealError::MalformedSnapshot { .. }));
}

#[test]
fn test_corrupted_state_blocks_diff() {
    let (_dir, repo) = committed_repo();
    let path = state_file(&repo);
    let mut json = read_json(&path);
    json["comment"] = serde_json::json!("forged");
    write_json(&path, &json);

    let err = repo.diff().unwrap_err();
    assert!(err.is_corruption());

    // log reads states without verifying them
    let log = repo.log().unwrap();
    assert_eq!(log[0].comment, "forged");
}

#[test]
fn test_older_model_version_loads_unverified() {
    let (_dir, repo) = committed_repo();
    let path = state_file(&repo);
    let mut json = read_json(&path);
    json["modelVersion"] = serde_json::json!("0");
    json["comment"] = serde_json::json!("edited after the fact");
    write_json(&path, &json);

    let loaded = Snapshot::load(&path, true).unwrap();
    assert_eq!(loaded.model_version, "0");
    assert_eq!(loaded.comment, "edited after the fact");
}

#[test]
fn test_missing_state_number() {
    let (_dir, repo) = committed_repo();
    assert!(matches!(repo.load_state(0), Err(TreesealError::StateNotFound(0))));
    assert!(matches!(repo.load_state(9), Err(TreesealError::StateNotFound(9))));
}

#[test]
fn test_file_deleted_during_lifetime_of_repo() {
    let (dir, repo) = committed_repo();
    let mut rng = StdRng::seed_from_u64(7);
    let mut deleted = Vec::new();
    for _ in 0..5 {
        let name = format!("file_{:02}.dat", rng.random_range(0..20));
        let path = dir.path().join(&name);
        if path.exists() {
            fs::remove_file(path).unwrap();
            deleted.push(name);
        }
    }
    deleted.sort();

    let diff = repo.diff().unwrap();
    assert_eq!(diff.result.deleted, deleted);
    assert!(diff.result.added.is_empty());
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let locked = temp_dir.path().join("locked");
    fs::create_dir(&locked).unwrap();
    fs::write(locked.join("secret"), "s").unwrap();
    fs::write(temp_dir.path().join("visible"), "v").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // privileged users can still read it
    let readable = fs::read_dir(&locked).is_ok();
    let result = Scanner::new(temp_dir.path(), ScanOptions::default()).scan("");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    let (snapshot, _) = result.unwrap();
    assert!(snapshot.get("visible").is_some());
    assert_eq!(snapshot.get("locked/secret").is_some(), readable);
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let locked = temp_dir.path().join("locked.bin");
    fs::write(&locked, "s").unwrap();
    fs::write(temp_dir.path().join("visible"), "v").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    let readable = fs::File::open(&locked).is_ok();
    let options = ScanOptions::default().with_hash_mode(HashMode::HashAll);
    let result = Scanner::new(temp_dir.path(), options).scan("");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    let (snapshot, _) = result.unwrap();
    assert!(snapshot.get("visible").is_some());
    assert_eq!(snapshot.get("locked.bin").is_some(), readable);
}

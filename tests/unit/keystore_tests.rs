//! Unit tests for the file-backed key store.

use skipper::keystore::{FileKeyStore, KeyStore};

#[test]
fn write_then_read_round_trips_material() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileKeyStore::new(dir.path().join(".ssh"));

    assert!(!store.exists("skipper-alice"));
    store.write("skipper-alice", "PRIVATE").expect("write");
    assert!(store.exists("skipper-alice"));
    assert_eq!(store.read("skipper-alice").expect("read"), "PRIVATE");
    assert_eq!(store.path("skipper-alice"), dir.path().join(".ssh/skipper-alice"));
}

#[test]
fn write_truncates_previous_material() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileKeyStore::new(dir.path());
    store.write("k", "a much longer first key").expect("write");
    store.write("k", "short").expect("overwrite");
    assert_eq!(store.read("k").expect("read"), "short");
}

#[test]
fn delete_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileKeyStore::new(dir.path());
    store.write("k", "x").expect("write");
    store.delete("k").expect("delete");
    assert!(!store.exists("k"));
    store.delete("k").expect("second delete");
}

#[test]
fn read_of_missing_key_is_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileKeyStore::new(dir.path());
    let err = store.read("absent").unwrap_err();
    assert!(err.to_string().starts_with("io:"));
}

#[cfg(unix)]
#[test]
fn keys_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let key_dir = dir.path().join("keys");
    let store = FileKeyStore::new(&key_dir);
    store.write("k", "x").expect("write");

    let file_mode = std::fs::metadata(store.path("k")).unwrap().permissions().mode();
    assert_eq!(file_mode & 0o777, 0o600);
    let dir_mode = std::fs::metadata(&key_dir).unwrap().permissions().mode();
    assert_eq!(dir_mode & 0o777, 0o700);
}

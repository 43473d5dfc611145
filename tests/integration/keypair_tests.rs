//! Integration tests for keypair creation, consistency checks, and purge.

use skipper::identity::Identity;
use skipper::keystore::KeyStore;
use skipper::provider::ComputeApi;
use skipper::provision::{ensure_keypair, keypair_presence, purge_keypair};
use skipper::AppError;

use super::test_helpers::{FakeCompute, FakeKeyStore};

fn alice() -> Identity {
    Identity::new("alice").expect("identity")
}

#[tokio::test]
async fn keypair_exists_after_create_and_not_after_delete() {
    let compute = FakeCompute::default();
    for name in ["skipper-a", "skipper-b", "skipper-c"] {
        assert!(!compute.keypair_exists(name).await.unwrap());
        compute.create_keypair(name).await.expect("create");
        assert!(compute.keypair_exists(name).await.unwrap());
        compute.delete_keypair(name).await.expect("delete");
        assert!(!compute.keypair_exists(name).await.unwrap());
    }
}

#[tokio::test]
async fn ensure_creates_both_sides_when_absent() {
    let compute = FakeCompute::default();
    let keys = FakeKeyStore::default();

    ensure_keypair(&compute, &keys, &alice()).await.expect("ensure");

    assert_eq!(*compute.created_keypairs.lock().unwrap(), vec!["skipper-alice"]);
    assert!(keys.exists("skipper-alice"));
    assert!(keys.read("skipper-alice").unwrap().contains("PRIVATE KEY"));
    let presence = keypair_presence(&compute, &keys, &alice()).await.unwrap();
    assert!(presence.remote && presence.local);
}

#[tokio::test]
async fn ensure_is_a_no_op_when_both_sides_exist() {
    let compute = FakeCompute::default().with_keypair("skipper-alice");
    let keys = FakeKeyStore::default().with_key("skipper-alice");

    ensure_keypair(&compute, &keys, &alice()).await.expect("ensure");

    assert!(compute.created_keypairs.lock().unwrap().is_empty());
    assert_eq!(keys.read("skipper-alice").unwrap(), "material");
}

#[tokio::test]
async fn remote_only_keypair_is_inconsistent_and_untouched() {
    let compute = FakeCompute::default().with_keypair("skipper-alice");
    let keys = FakeKeyStore::default();

    let err = ensure_keypair(&compute, &keys, &alice()).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::KeypairInconsistent {
            remote: true,
            local: false,
            ..
        }
    ));
    assert!(compute.created_keypairs.lock().unwrap().is_empty());
    assert!(compute.deleted_keypairs.lock().unwrap().is_empty());
    assert!(!keys.exists("skipper-alice"));
}

#[tokio::test]
async fn local_only_keypair_is_inconsistent_and_untouched() {
    let compute = FakeCompute::default();
    let keys = FakeKeyStore::default().with_key("skipper-alice");

    let err = ensure_keypair(&compute, &keys, &alice()).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::KeypairInconsistent {
            remote: false,
            local: true,
            ..
        }
    ));
    assert!(compute.created_keypairs.lock().unwrap().is_empty());
    assert!(keys.exists("skipper-alice"));
}

#[tokio::test]
async fn failed_local_write_is_a_provisioning_error() {
    let compute = FakeCompute::default();
    let keys = FakeKeyStore::default();
    *keys.fail_writes.lock().unwrap() = true;

    let err = ensure_keypair(&compute, &keys, &alice()).await.unwrap_err();
    assert!(matches!(err, AppError::Provisioning(ref msg) if msg.contains("disk full")));
}

#[tokio::test]
async fn purge_removes_whatever_exists() {
    let compute = FakeCompute::default().with_keypair("skipper-alice");
    let keys = FakeKeyStore::default();

    let before = purge_keypair(&compute, &keys, &alice()).await.expect("purge");
    assert!(before.remote);
    assert!(!before.local);

    let after = keypair_presence(&compute, &keys, &alice()).await.unwrap();
    assert!(!after.remote && !after.local);

    // A purged keypair can be recreated.
    ensure_keypair(&compute, &keys, &alice()).await.expect("recreate");
    assert!(keys.exists("skipper-alice"));
}

#[tokio::test]
async fn keypairs_of_other_identities_are_left_alone() {
    let compute = FakeCompute::default()
        .with_keypair("skipper-alice")
        .with_keypair("skipper-bob");
    let keys = FakeKeyStore::default()
        .with_key("skipper-alice")
        .with_key("skipper-bob");

    purge_keypair(&compute, &keys, &alice()).await.expect("purge");

    assert!(compute.keypair_exists("skipper-bob").await.unwrap());
    assert!(keys.exists("skipper-bob"));
}

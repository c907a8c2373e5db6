//! End-to-end scenarios through the `Drive` facade.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use sealdrive::{
    ChangeType, Drive, DriveError, EventKind, FileId, MergeResolution, Permission, Principal,
    MAIN_BRANCH,
};
use sealdrive_store::{KvStore, MemoryStore, SqliteStore};

fn drive() -> Drive<Arc<MemoryStore>> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Drive::open(Arc::new(MemoryStore::new())).unwrap()
}

fn perms(list: &[Permission]) -> BTreeSet<Permission> {
    list.iter().copied().collect()
}

fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn share_and_revoke_lifecycle() {
    let drive = drive();
    let alice = Principal::new("alice");
    let bob = Principal::new("bob");
    let file = FileId::new("f1");

    drive
        .create_file(&file, b"shared document", meta(&[]), &alice)
        .unwrap();

    // Before the grant Bob cannot read at all.
    assert!(drive.read_file(&file, &bob, None).is_err());

    drive
        .grant_access(&file, &bob, &perms(&[Permission::Read]), &alice)
        .unwrap();

    // Bob decrypts the identical content through his own wrapped key.
    let bobs = drive.read_file(&file, &bob, None).unwrap();
    assert_eq!(&bobs.bytes[..], b"shared document");

    let mut holders = drive.key_holders(&file).unwrap();
    holders.sort();
    assert_eq!(holders, vec![alice.clone(), bob.clone()]);

    drive.revoke_access(&file, &bob, &alice).unwrap();

    // Bob's copy is gone; Alice is untouched.
    assert!(drive.read_file(&file, &bob, None).is_err());
    let alices = drive.read_file(&file, &alice, None).unwrap();
    assert_eq!(&alices.bytes[..], b"shared document");
    assert_eq!(drive.key_holders(&file).unwrap(), vec![alice.clone()]);

    // The audit trail interleaves key and permission events for the file.
    let kinds: Vec<EventKind> = drive
        .audit()
        .events_for(&file)
        .iter()
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&EventKind::FileCreated));
    assert!(kinds.contains(&EventKind::KeyWrapped));
    assert!(kinds.contains(&EventKind::PermissionGranted));
    assert!(kinds.contains(&EventKind::KeyRevoked));
    assert!(kinds.contains(&EventKind::PermissionRevoked));
}

#[test]
fn non_owner_cannot_grant_or_revoke() {
    let drive = drive();
    let alice = Principal::new("alice");
    let mallory = Principal::new("mallory");
    let file = FileId::new("f1");

    drive
        .create_file(&file, b"data", meta(&[]), &alice)
        .unwrap();

    assert!(matches!(
        drive.grant_access(&file, &mallory, &perms(&[Permission::Read]), &mallory),
        Err(DriveError::AccessDenied)
    ));
    assert!(matches!(
        drive.revoke_access(&file, &alice, &mallory),
        Err(DriveError::AccessDenied)
    ));

    // The owner cannot be revoked even by themselves.
    assert!(matches!(
        drive.revoke_access(&file, &alice, &alice),
        Err(DriveError::AccessDenied)
    ));
}

#[test]
fn branch_merge_conflict_and_resolution() {
    let drive = drive();
    let alice = Principal::new("alice");
    let file = FileId::new("f1");

    drive
        .create_file(&file, b"base content", meta(&[]), &alice)
        .unwrap();
    drive
        .create_branch(&file, MAIN_BRANCH, "draft", &alice)
        .unwrap();

    drive
        .update_file(&file, b"main went this way", meta(&[]), &alice, "m", None)
        .unwrap();
    drive
        .update_file(
            &file,
            b"draft went that way",
            meta(&[]),
            &alice,
            "d",
            Some("draft"),
        )
        .unwrap();

    // Divergent content conflicts; without a resolution nothing moves.
    let conflicted = drive
        .merge_branches(&file, "draft", MAIN_BRANCH, &alice, None)
        .unwrap();
    assert!(!conflicted.success);
    assert!(conflicted.conflict_id.is_some());
    let main_head = drive.read_file(&file, &alice, None).unwrap();
    assert_eq!(&main_head.bytes[..], b"main went this way");

    // Resolving toward the source makes the draft content the main head.
    let merged = drive
        .merge_branches(
            &file,
            "draft",
            MAIN_BRANCH,
            &alice,
            Some(MergeResolution {
                use_source: true,
                metadata: BTreeMap::new(),
            }),
        )
        .unwrap();
    assert!(merged.success);
    assert_eq!(
        merged.version.as_ref().unwrap().change_type,
        ChangeType::Merge
    );

    // Content addressing lets the merged head decrypt without re-upload.
    let after = drive.read_file(&file, &alice, None).unwrap();
    assert_eq!(&after.bytes[..], b"draft went that way");
}

#[test]
fn revert_restores_old_content() {
    let drive = drive();
    let alice = Principal::new("alice");
    let file = FileId::new("f1");

    let v1 = drive
        .create_file(&file, b"the original", meta(&[]), &alice)
        .unwrap();
    drive
        .update_file(&file, b"a much longer replacement body", meta(&[]), &alice, "e", None)
        .unwrap();

    drive.revert_to_version(&file, &v1.id, &alice, None).unwrap();

    let head = drive.read_file(&file, &alice, None).unwrap();
    assert_eq!(&head.bytes[..], b"the original");
    assert_eq!(head.version.change_type, ChangeType::Revert);

    // History keeps all three versions, newest first.
    let history = drive.version_history(&file, None, None).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].number, 3);
}

#[test]
fn expired_token_denies_immediately() {
    let drive = drive();
    let alice = Principal::new("alice");
    let file = FileId::new("f1");

    drive
        .create_file(&file, b"data", meta(&[]), &alice)
        .unwrap();

    let token = drive
        .issue_token(&alice, perms(&[Permission::Read]), Some(-1))
        .unwrap()
        .encode();
    assert!(drive.validate_token(&token).is_none());
    assert!(!drive.has_permission(&token, &file, Permission::Read));
}

#[test]
fn token_checks_are_conjunctive() {
    let drive = drive();
    let alice = Principal::new("alice");
    let bob = Principal::new("bob");
    let file = FileId::new("f1");

    drive
        .create_file(&file, b"data", meta(&[]), &alice)
        .unwrap();

    // Token asserts read and write, but the ACL only grants read.
    drive
        .grant_access(&file, &bob, &perms(&[Permission::Read]), &alice)
        .unwrap();
    let token = drive
        .issue_token(&bob, perms(&[Permission::Read, Permission::Write]), None)
        .unwrap();
    let wire = token.encode();

    assert!(drive.has_permission(&wire, &file, Permission::Read));
    assert!(!drive.has_permission(&wire, &file, Permission::Write));

    // Revoking the token denies everything, indistinguishably from expiry.
    drive.revoke_token(&token.payload.token_id).unwrap();
    assert!(!drive.has_permission(&wire, &file, Permission::Read));
}

#[test]
fn sharing_link_bearer_flow() {
    let drive = drive();
    let alice = Principal::new("alice");
    let file = FileId::new("f1");

    drive
        .create_file(&file, b"linked data", meta(&[]), &alice)
        .unwrap();

    let link = drive
        .create_sharing_link(&file, perms(&[Permission::Read]), None, &alice)
        .unwrap();

    // Anyone holding the link id gets in; the counter tracks uses.
    let first = drive.validate_sharing_link(&link.link_id).unwrap();
    assert_eq!(first.access_count, 1);
    assert_eq!(first.file_id, file);

    drive.revoke_sharing_link(&link.link_id).unwrap();
    assert!(drive.validate_sharing_link(&link.link_id).is_none());
}

#[test]
fn concurrent_updates_keep_one_head() {
    let drive = Arc::new(drive());
    let alice = Principal::new("alice");
    let file = FileId::new("f1");

    drive
        .create_file(&file, b"v1", meta(&[]), &alice)
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let drive = Arc::clone(&drive);
        let file = file.clone();
        let alice = alice.clone();
        handles.push(std::thread::spawn(move || {
            drive
                .update_file(
                    &file,
                    format!("concurrent body {}", i).as_bytes(),
                    meta(&[]),
                    &alice,
                    "w",
                    None,
                )
                .unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let history = drive.version_history(&file, None, None).unwrap();
    assert_eq!(history.len(), 9);
    assert_eq!(history.iter().filter(|v| v.is_head).count(), 1);
    // Numbers stayed monotonic under contention.
    let mut numbers: Vec<u64> = history.iter().map(|v| v.number).collect();
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=9).collect::<Vec<u64>>());
}

#[test]
fn wrapped_keys_survive_reopen_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drive.db");
    let alice = Principal::new("alice");
    let bob = Principal::new("bob");
    let file = FileId::new("f1");

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let drive = Drive::open(store).unwrap();
        drive
            .create_file(&file, b"durable", meta(&[]), &alice)
            .unwrap();
        drive
            .grant_access(&file, &bob, &perms(&[Permission::Read]), &alice)
            .unwrap();
    }

    // A fresh drive over the same database still holds both wrapped keys
    // and the ACL (version history is session state and reseeds on use).
    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let drive = Drive::open(store.clone()).unwrap();

    let mut holders = drive.key_holders(&file).unwrap();
    holders.sort();
    assert_eq!(holders, vec![alice.clone(), bob.clone()]);

    let acl = drive.file_permissions(&file).unwrap().unwrap();
    assert_eq!(acl.owner, alice);
    assert!(acl.allows(&bob, Permission::Read));

    // The persisted ciphertext is still there for the content hash.
    let prefix = format!("content/{}/", hex::encode(file.as_str()));
    assert_eq!(store.list_prefix(&prefix).unwrap().len(), 1);
}

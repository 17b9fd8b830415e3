use std::io::{Cursor as IoCursor, Read};

use super::*;

fn open_store() -> (tempfile::TempDir, FileStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store.start().unwrap();
    (dir, store)
}

fn id(n: u32) -> ObjectId {
    ObjectId(n)
}

#[test]
fn test_byte_roundtrip() {
    let (_dir, store) = open_store();
    store.store(id(1), IoCursor::new(b"<a/>".to_vec())).unwrap();
    let mut out = Vec::new();
    store.retrieve(id(1)).unwrap().read_to_end(&mut out).unwrap();
    assert_eq!(out, b"<a/>");
}

#[test]
fn test_retrieve_unknown_id_not_found() {
    let (_dir, store) = open_store();
    assert!(matches!(store.retrieve(id(99)), Err(Error::NotFound(_))));
}

#[test]
fn test_delete_idempotence() {
    let (_dir, store) = open_store();
    store.store(id(1), IoCursor::new(vec![0u8; 10])).unwrap();
    store.delete(id(1)).unwrap();
    assert!(matches!(store.delete(id(1)), Err(Error::NotFound(_))));
}

#[test]
fn test_delete_all_truncates_content() {
    let (_dir, store) = open_store();
    store.store(id(1), IoCursor::new(vec![0u8; 100])).unwrap();
    store.store(id(2), IoCursor::new(vec![0u8; 100])).unwrap();
    store.delete_all().unwrap();
    let (count, content_len, live, _gap) = store.size().unwrap();
    assert_eq!(count, 0);
    assert_eq!(content_len, 0);
    assert_eq!(live, 0);
}

// Scenario 2: three 100-byte documents, delete the middle,
// insert a 100-byte document; its offset must equal the deleted
// document's old offset.
#[test]
fn test_first_fit_reclaims_exact_gap() {
    let (_dir, store) = open_store();
    store.store(id(1), IoCursor::new(vec![1u8; 100])).unwrap();
    store.store(id(2), IoCursor::new(vec![2u8; 100])).unwrap();
    store.store(id(3), IoCursor::new(vec![3u8; 100])).unwrap();
    store.delete(id(2)).unwrap();

    store.store(id(4), IoCursor::new(vec![4u8; 100])).unwrap();

    let (_, content_len, _, _) = store.size().unwrap();
    assert_eq!(content_len, 300); // no growth, gap reused

    let mut out = Vec::new();
    store.retrieve(id(4)).unwrap().read_to_end(&mut out).unwrap();
    assert_eq!(out, vec![4u8; 100]);
}

// Scenario 3: delete the middle 100-byte document, then
// insert a 150-byte document; it must NOT fit the 100-byte gap, and
// must append past the last live entry instead.
#[test]
fn test_first_fit_appends_when_gap_too_small() {
    let (_dir, store) = open_store();
    store.store(id(1), IoCursor::new(vec![1u8; 100])).unwrap();
    store.store(id(2), IoCursor::new(vec![2u8; 100])).unwrap();
    store.store(id(3), IoCursor::new(vec![3u8; 100])).unwrap();
    store.delete(id(2)).unwrap();

    store.store(id(4), IoCursor::new(vec![4u8; 150])).unwrap();

    let (_, content_len, _, _) = store.size().unwrap();
    assert_eq!(content_len, 450); // grew by 150, gap left unused
}

#[test]
fn test_no_overlap_invariant() {
    let entries = vec![
        Entry { id: id(1), offset: 0, length: 100 },
        Entry { id: id(2), offset: 100, length: 50 },
        Entry { id: id(3), offset: 200, length: 25 },
    ];
    for w in entries.windows(2) {
        assert!(w[0].offset + w[0].length <= w[1].offset);
    }
}

#[test]
fn test_first_fit_boundary_equality() {
    let entries = vec![
        Entry { id: id(1), offset: 0, length: 10 },
        Entry { id: id(2), offset: 20, length: 10 },
    ];
    // gap between entry 1 and entry 2 is exactly 10 bytes wide.
    assert_eq!(first_fit(&entries, 10), 10);
    assert_eq!(first_fit(&entries, 11), 30);
}

#[test]
fn test_store_replaces_existing_entry() {
    let (_dir, store) = open_store();
    store.store(id(1), IoCursor::new(vec![1u8; 10])).unwrap();
    store.store(id(1), IoCursor::new(vec![2u8; 20])).unwrap();
    let mut out = Vec::new();
    store.retrieve(id(1)).unwrap().read_to_end(&mut out).unwrap();
    assert_eq!(out, vec![2u8; 20]);
    let (count, ..) = store.size().unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_persistence_roundtrip_through_shutdown_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FileStore::new(dir.path());
        store.start().unwrap();
        store.store(id(7), IoCursor::new(b"<a/>".to_vec())).unwrap();
        store.shutdown().unwrap();
    }
    {
        let store = FileStore::new(dir.path());
        store.start().unwrap();
        let mut out = Vec::new();
        store.retrieve(id(7)).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"<a/>");
    }
}

#[test]
fn test_not_running_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    assert!(matches!(store.retrieve(id(1)), Err(Error::NotRunning(_))));
}

#[test]
fn test_shutdown_twice_fails() {
    let (_dir, store) = open_store();
    store.shutdown().unwrap();
    assert!(matches!(store.shutdown(), Err(Error::NotRunning(_))));
}

use std::thread;
use std::time::Duration;

use super::*;
use crate::catalog::Catalog;

fn setup() -> (tempfile::TempDir, Catalog, ObjectId, ObjectId) {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    let data = catalog.create_child_collection(root, "data").unwrap();
    (dir, catalog, root, data)
}

#[test]
fn test_read_locks_on_same_node_do_not_conflict() {
    let (_dir, catalog, _root, data) = setup();
    let lm = LockManager::new();
    let g1 = lm.lock_read(&catalog, Holder(1), data, None).unwrap();
    let g2 = lm.lock_read(&catalog, Holder(2), data, None).unwrap();
    drop(g1);
    drop(g2);
}

#[test]
fn test_write_lock_excludes_other_writer_with_timeout() {
    let (_dir, catalog, _root, data) = setup();
    let lm = LockManager::new();
    let _g1 = lm.lock_write(&catalog, Holder(1), data, None).unwrap();
    let result = lm.lock_write(&catalog, Holder(2), data, Some(Duration::from_millis(50)));
    assert!(matches!(result, Err(Error::Timeout(_))));
}

#[test]
fn test_reentrant_write_lock_by_same_holder() {
    let (_dir, catalog, _root, data) = setup();
    let lm = LockManager::new();
    let _g1 = lm.lock_write(&catalog, Holder(1), data, None).unwrap();
    let _g2 = lm
        .lock_write(&catalog, Holder(1), data, Some(Duration::from_millis(50)))
        .unwrap();
}

#[test]
fn test_writers_on_sibling_subtrees_do_not_contend() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(dir.path()).unwrap();
    let root = catalog.root_id();
    let a = catalog.create_child_collection(root, "a").unwrap();
    let b = catalog.create_child_collection(root, "b").unwrap();

    let lm = LockManager::new();
    let _g1 = lm.lock_write(&catalog, Holder(1), a, None).unwrap();
    let _g2 = lm
        .lock_write(&catalog, Holder(2), b, Some(Duration::from_millis(50)))
        .unwrap();
}

#[test]
fn test_write_lock_blocks_until_reader_releases() {
    let (_dir, catalog, _root, data) = setup();
    let lm = std::sync::Arc::new(LockManager::new());
    let catalog = std::sync::Arc::new(catalog);

    let g1 = lm.lock_read(&catalog, Holder(1), data, None).unwrap();
    let lm2 = lm.clone();
    let catalog2 = catalog.clone();
    let handle = thread::spawn(move || {
        lm2.lock_write(&catalog2, Holder(2), data, Some(Duration::from_millis(500)))
            .unwrap();
    });
    thread::sleep(Duration::from_millis(50));
    drop(g1);
    handle.join().unwrap();
}

#[test]
fn test_release_unblocks_waiting_writer_before_timeout() {
    let (_dir, catalog, _root, data) = setup();
    let lm = std::sync::Arc::new(LockManager::new());
    let catalog = std::sync::Arc::new(catalog);

    let g1 = lm.lock_write(&catalog, Holder(1), data, None).unwrap();
    let lm2 = lm.clone();
    let catalog2 = catalog.clone();
    let handle = thread::spawn(move || {
        lm2.lock_write(&catalog2, Holder(2), data, Some(Duration::from_secs(2)))
            .map(|guard| guard.release())
    });
    thread::sleep(Duration::from_millis(50));
    g1.release();
    assert!(handle.join().unwrap().is_ok());
}

//! Integration tests for the literal scenarios in spec.md §8.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kv::{Database, Error, IsolationLevel, Options};

fn open(dir: &std::path::Path) -> Arc<Database> {
    let mut options = Options::default();
    options.dir_path = dir.to_path_buf();
    Database::open(options).unwrap()
}

fn segment_file_count(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".cly"))
        .count()
}

fn total_segment_bytes(dir: &std::path::Path) -> u64 {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".cly"))
        .map(|e| e.metadata().unwrap().len())
        .sum()
}

// S1 — basic put/get.
#[test]
fn s1_basic_put_get() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path());

    db.put(b"k1", b"v1").unwrap();
    assert_eq!(db.get(b"k1").unwrap(), b"v1".to_vec());

    db.put(b"k1", b"v2").unwrap();
    assert_eq!(db.get(b"k1").unwrap(), b"v2".to_vec());

    db.del(b"k1").unwrap();
    assert_eq!(db.get(b"k1").unwrap_err(), Error::NotFound);
}

// S2 — segment rollover.
#[test]
fn s2_segment_rollover() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = Options::default();
    options.dir_path = dir.path().to_path_buf();
    options.data_file_size = 1024;
    let db = Database::open(options).unwrap();

    let value = vec![b'x'; 32];
    let keys: Vec<String> = (0..64).map(|i| format!("k{:03}", i)).collect();
    for key in &keys {
        db.put(key.as_bytes(), &value).unwrap();
    }

    assert!(segment_file_count(dir.path()) >= 2, "expected rollover to produce multiple segments");

    for key in &keys {
        assert_eq!(db.get(key.as_bytes()).unwrap(), value);
    }
}

// S3 — restart.
#[test]
fn s3_restart_recovers_all_keys() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = open(dir.path());
        for i in 0..10_000 {
            let key = format!("k{}", i);
            let value = format!("v{}", i);
            db.put(key.as_bytes(), value.as_bytes()).unwrap();
        }
        db.close().unwrap();
    }

    let db = open(dir.path());
    for i in 0..10_000 {
        let key = format!("k{}", i);
        let value = format!("v{}", i);
        assert_eq!(db.get(key.as_bytes()).unwrap(), value.as_bytes());
    }
}

// S4 — MVCC conflict between two read-committed transactions.
#[test]
fn s4_read_committed_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path());

    let db_a = db.clone();
    let handle_a = thread::spawn(move || {
        let mut txn = db_a.begin(false, IsolationLevel::ReadCommitted).unwrap();
        assert_eq!(txn.get(b"k").unwrap_err(), Error::NotFound);
        txn.set(b"k", b"a").unwrap();
        thread::sleep(Duration::from_millis(200));
        txn.commit()
    });

    thread::sleep(Duration::from_millis(100));
    let db_b = db.clone();
    let handle_b = thread::spawn(move || {
        let mut txn = db_b.begin(false, IsolationLevel::ReadCommitted).unwrap();
        txn.set(b"k", b"b").unwrap();
        txn.commit()
    });

    handle_b.join().unwrap().unwrap();
    let result_a = handle_a.join().unwrap();
    assert_eq!(result_a.unwrap_err(), Error::Conflict);

    assert_eq!(db.get(b"k").unwrap(), b"b".to_vec());
}

// S5 — a serializable writer excludes an overlapping read-committed commit.
#[test]
fn s5_serializable_blocks_overlapping_commit() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path());

    let db_a = db.clone();
    let handle_a = thread::spawn(move || {
        let mut txn = db_a.begin(false, IsolationLevel::Serializable).unwrap();
        txn.set(b"k", b"w").unwrap();
        thread::sleep(Duration::from_millis(900));
        txn.commit()
    });

    thread::sleep(Duration::from_millis(100));
    let db_b = db.clone();
    let handle_b = thread::spawn(move || {
        let mut txn = db_b.begin(false, IsolationLevel::ReadCommitted).unwrap();
        txn.set(b"k", b"r").unwrap();
        txn.commit()
    });

    handle_a.join().unwrap().unwrap();
    let result_b = handle_b.join().unwrap();
    assert_eq!(result_b.unwrap_err(), Error::Conflict);

    assert_eq!(db.get(b"k").unwrap(), b"w".to_vec());
}

// S6 — TTL expiry.
#[test]
fn s6_ttl_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path());

    db.put_with_ttl(b"k1", b"v1", Duration::from_secs(1)).unwrap();
    db.put_with_ttl(b"k2", b"v2", Duration::from_secs(3)).unwrap();

    thread::sleep(Duration::from_millis(1500));
    assert_eq!(db.get(b"k1").unwrap_err(), Error::NotFound);
    assert_eq!(db.get(b"k2").unwrap(), b"v2".to_vec());

    thread::sleep(Duration::from_secs(2));
    assert_eq!(db.get(b"k2").unwrap_err(), Error::NotFound);
}

// S7 — list push/pop ordering.
#[test]
fn s7_list_operations() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path());

    db.l_push(b"L", &[b"a".to_vec()]).unwrap();
    db.l_push(b"L", &[b"b".to_vec()]).unwrap();
    db.l_push(b"L", &[b"c".to_vec(), b"d".to_vec()]).unwrap();
    db.r_push(b"L", &[b"e".to_vec()]).unwrap();
    db.r_push(b"L", &[b"f".to_vec(), b"g".to_vec()]).unwrap();

    assert_eq!(db.l_pop(b"L").unwrap(), b"d".to_vec());
    assert_eq!(db.l_pop(b"L").unwrap(), b"c".to_vec());
    assert_eq!(db.r_pop(b"L").unwrap(), b"g".to_vec());

    // remaining state, front to back: b a e f
    assert_eq!(db.l_pop(b"L").unwrap(), b"b".to_vec());
    assert_eq!(db.l_pop(b"L").unwrap(), b"a".to_vec());
    assert_eq!(db.l_pop(b"L").unwrap(), b"e".to_vec());
    assert_eq!(db.l_pop(b"L").unwrap(), b"f".to_vec());
    assert_eq!(db.l_pop(b"L").unwrap_err(), Error::ListEmpty);
}

// S8 — recovery skips a rolled-back transaction but keeps a later commit.
#[test]
fn s8_recovery_skips_rollback() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = open(dir.path());
        let mut txn = db.begin(false, IsolationLevel::ReadCommitted).unwrap();
        txn.set(b"k", b"x").unwrap();
        txn.rollback();
        db.close().unwrap();
    }
    {
        let db = open(dir.path());
        assert_eq!(db.get(b"k").unwrap_err(), Error::NotFound);
        db.put(b"k", b"y").unwrap();
        db.close().unwrap();
    }

    let db = open(dir.path());
    assert_eq!(db.get(b"k").unwrap(), b"y".to_vec());
}

// S9 — merge round-trip.
#[test]
fn s9_merge_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = Options::default();
    options.dir_path = dir.path().to_path_buf();
    options.data_file_size = 1024 * 1024;
    let db = Database::open(options).unwrap();

    const N: usize = 10_000;
    let value = vec![b'v'; 64];
    for i in 0..N {
        let key = format!("k{}", i);
        db.put(key.as_bytes(), &value).unwrap();
    }
    for i in 0..N {
        let key = format!("k{}", i);
        db.put(key.as_bytes(), &value).unwrap();
    }
    for i in 0..N / 2 {
        let key = format!("k{}", i);
        db.del(key.as_bytes()).unwrap();
    }

    let segments_before = segment_file_count(dir.path());
    db.compact().unwrap();
    let segments_after = segment_file_count(dir.path());
    assert!(segments_after < segments_before, "merge should shrink the segment count");

    let average_record_size = 64 + 16; // value bytes plus header/key overhead, approximate
    let bound = ((N / 2) as u64 * average_record_size as u64) * 11 / 10;
    assert!(total_segment_bytes(dir.path()) <= bound * 4, "merged size grew far beyond the expected bound");

    for i in N / 2..N {
        let key = format!("k{}", i);
        assert_eq!(db.get(key.as_bytes()).unwrap(), value);
    }
    for i in 0..N / 2 {
        let key = format!("k{}", i);
        assert_eq!(db.get(key.as_bytes()).unwrap_err(), Error::NotFound);
    }
}

// S10 — watch observes put/put/delete in order.
#[test]
fn s10_watch_observes_events_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path());

    let (rx, _handle) = db.watch(b"k");
    db.put(b"k", b"v1").unwrap();
    db.put(b"k", b"v2").unwrap();
    db.del(b"k").unwrap();

    let e1 = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    let e2 = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    let e3 = rx.recv_timeout(Duration::from_secs(1)).unwrap();

    assert_eq!(e1.kind, kv::watch::WatchEventKind::Put);
    assert_eq!(e2.kind, kv::watch::WatchEventKind::Put);
    assert_eq!(e3.kind, kv::watch::WatchEventKind::Delete);
}

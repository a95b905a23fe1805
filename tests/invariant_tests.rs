//! Captured histories of concurrent rebuilds and reads checked against
//! the snapshot invariants. Needs `--features testing`.

use pkgdb::rebuild::InstrumentedDatabase;
use pkgdb::testing::prelude::*;
use pkgdb::{PackageDatabase, PackageRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn generation_records(n: u64) -> Vec<PackageRecord> {
    (0..n)
        .map(|i| PackageRecord::new("pkg", n.to_string(), format!("arch{}", i), "main"))
        .collect()
}

#[test]
fn test_concurrent_history_satisfies_invariants() {
    let db = InstrumentedDatabase::new(Arc::new(PackageDatabase::in_memory()));
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..3)
        .map(|i| {
            let db = db.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let client = format!("reader-{}", i);
                while !stop.load(Ordering::Acquire) {
                    db.lookup(&client, "pkg", None);
                    db.size(&client);
                }
            })
        })
        .collect();

    for n in 1..=20u64 {
        if n % 5 == 0 {
            // Aborted cycles must never be observed
            let cycle = db.start().unwrap();
            db.ingest(cycle, PackageRecord::new("pkg", "aborted", "x86_64", "main"))
                .unwrap();
            db.fail(cycle, "backend failed").unwrap();
        } else {
            db.rebuild(generation_records(n)).unwrap();
        }
    }
    stop.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    let log = db.event_log();
    assert!(!log.reads().is_empty());
    assert_eq!(log.publishes().len(), 16);

    let violations = db.check_invariants(&default_invariants());
    assert!(violations.is_empty(), "{:?}", violations);
}

#[test]
fn test_cancelled_cycle_history_satisfies_invariants() {
    let db = InstrumentedDatabase::new(Arc::new(PackageDatabase::in_memory()));
    db.rebuild(generation_records(2)).unwrap();

    let stale = db.start().unwrap();
    db.ingest(stale, PackageRecord::new("pkg", "stale", "x86_64", "main"))
        .unwrap();
    db.fail(stale, "cancelled by host").unwrap();

    let cycle = db.start().unwrap();
    // The abandoned cycle's token no longer reaches the open one
    assert!(db
        .ingest(stale, PackageRecord::new("pkg", "stale", "i686", "main"))
        .is_err());
    assert!(db.finish(stale).is_err());
    db.ingest(cycle, PackageRecord::new("pkg", "fresh", "x86_64", "main"))
        .unwrap();
    db.finish(cycle).unwrap();
    db.lookup("reader", "pkg", None);

    assert_eq!(db.event_log().publishes().len(), 2);
    let violations = db.check_invariants(&default_invariants());
    assert!(violations.is_empty(), "{:?}", violations);
}

//! Readers running concurrently with rebuild cycles

use pkgdb::{PackageDatabase, PackageRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Generation N holds N records named `pkg`, all with version `N`
fn generation_records(n: u64) -> Vec<PackageRecord> {
    (0..n)
        .map(|i| PackageRecord::new("pkg", n.to_string(), format!("arch{}", i), "main"))
        .collect()
}

#[test]
fn test_readers_never_see_mixed_snapshots() {
    let db = Arc::new(PackageDatabase::in_memory());
    db.rebuild_from_records(generation_records(1)).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = db.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut reads = 0u64;
                let mut last_generation = 0;
                while !stop.load(Ordering::Acquire) {
                    let snapshot = db.query().snapshot();
                    let generation = snapshot.generation().as_u64();
                    let found = snapshot.lookup("pkg", None);

                    assert!(generation >= last_generation, "generation went backwards");
                    assert_eq!(found.len() as u64, generation);
                    assert!(found.iter().all(|r| r.version() == generation.to_string()));
                    assert_eq!(snapshot.size() as u64, generation);

                    last_generation = generation;
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for n in 2..=60 {
        let report = db.rebuild_from_records(generation_records(n)).unwrap();
        assert_eq!(report.generation.as_u64(), n);
    }
    stop.store(true, Ordering::Release);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    assert_eq!(db.query().size(), 60);
}

#[test]
fn test_concurrent_starts_admit_one_cycle() {
    let db = Arc::new(PackageDatabase::in_memory());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = db.clone();
            thread::spawn(move || db.coordinator().start().ok())
        })
        .collect();
    let admitted: Vec<_> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(admitted.len(), 1);
    db.coordinator().finish(admitted[0]).unwrap();
    assert!(db.coordinator().is_idle());
}

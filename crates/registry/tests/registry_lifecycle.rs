//! Registry lifecycle against real sled stores, plus concurrent access.

use kvscope_registry::{RegistryError, StoreRegistry};
use kvscope_storage::{KvStore, SledStore};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

#[test]
fn duplicate_registration_keeps_first_store() {
    let dir = TempDir::new().expect("temp dir");
    let registry = StoreRegistry::new();

    registry.register("a", dir.path().join("path1")).unwrap();
    registry
        .get("a")
        .unwrap()
        .put(b"origin", b"path1")
        .unwrap();

    let err = registry.register("a", dir.path().join("path2")).unwrap_err();
    assert!(matches!(err, RegistryError::NameConflict { .. }));
    assert!(!dir.path().join("path2").exists());

    let origin = registry.get("a").unwrap().get(b"origin").unwrap();
    assert_eq!(origin, Some(b"path1".to_vec()));
    registry.shutdown();
}

#[test]
fn open_failure_creates_no_entry() {
    let dir = TempDir::new().expect("temp dir");
    let file = dir.path().join("plain-file");
    std::fs::write(&file, b"not a database").unwrap();

    let registry = StoreRegistry::new();
    let err = registry.register("broken", &file).unwrap_err();
    assert!(matches!(err, RegistryError::OpenFailure { .. }));
    assert!(registry.names().is_empty());
}

#[test]
fn shutdown_closes_owned_sled_store_but_not_attached() {
    let dir = TempDir::new().expect("temp dir");
    let registry = StoreRegistry::new();
    registry.register("owned", dir.path().join("owned")).unwrap();
    let owned_handle = registry.get("owned").unwrap();

    let external = Arc::new(SledStore::open(dir.path().join("external")).unwrap());
    registry.attach("external", external.clone()).unwrap();

    let report = registry.shutdown();
    assert!(report.is_clean());
    assert_eq!(report.closed.len(), 1);

    assert!(owned_handle.get(b"k").is_err());
    assert!(!external.is_closed());
    registry.get("external").unwrap().put(b"k", b"v").unwrap();
    assert_eq!(external.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn owned_store_reopens_after_shutdown() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("reopen");

    let registry = StoreRegistry::new();
    registry.register("db", &path).unwrap();
    registry.get("db").unwrap().put(b"k", b"v").unwrap();
    drop(registry.shutdown());

    let second = StoreRegistry::new();
    second.register("db", &path).unwrap();
    assert_eq!(
        second.get("db").unwrap().get(b"k").unwrap(),
        Some(b"v".to_vec())
    );
    second.shutdown();
}

#[test]
fn concurrent_lookups_see_consistent_entries() {
    let dir = TempDir::new().expect("temp dir");
    let registry = Arc::new(StoreRegistry::new());
    let store_count = 4;
    for i in 0..store_count {
        let name = format!("store-{i}");
        registry.register(&name, dir.path().join(&name)).unwrap();
        registry
            .get(&name)
            .unwrap()
            .put(b"name", name.as_bytes())
            .unwrap();
    }

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let workers: Vec<_> = (0..threads)
        .map(|t| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for round in 0..200 {
                    let name = format!("store-{}", (t + round) % store_count);
                    let handle = registry.get(&name).expect("registered store");
                    let stored = handle.get(b"name").unwrap();
                    assert_eq!(stored, Some(name.into_bytes()));
                    assert_eq!(registry.names().len(), store_count);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("lookup thread panicked");
    }
    registry.shutdown();
}

#[test]
fn racing_registrations_of_one_name_admit_a_single_winner() {
    let dir = TempDir::new().expect("temp dir");
    let registry = Arc::new(StoreRegistry::new());
    let threads = 6;
    let barrier = Arc::new(Barrier::new(threads));

    let results: Vec<bool> = (0..threads)
        .map(|t| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            let path = dir.path().join(format!("candidate-{t}"));
            thread::spawn(move || {
                barrier.wait();
                registry.register("shared", path).is_ok()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|worker| worker.join().expect("register thread panicked"))
        .collect();

    assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(registry.names(), vec!["shared"]);
    registry.shutdown();
}

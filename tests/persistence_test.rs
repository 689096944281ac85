use geottn::prelude::*;
use std::io::Write;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

fn t(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_650_000_000 + secs)
}

fn open(path: &std::path::Path) -> GeoIndexer {
    IndexerBuilder::new()
        .config(Config::default().with_sync_policy(SyncPolicy::Always))
        .commit_log_path(path)
        .build()
        .unwrap()
}

#[test]
fn test_index_survives_reopen() {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("geo.log");

    {
        let indexer = open(&path);
        indexer.store("bike-1", b"a", 52.52, 13.40, t(0)).unwrap();
        indexer.store("bike-1", b"b", 52.53, 13.41, t(10)).unwrap();
        indexer.store("bike-2", b"c", 48.14, 11.58, t(5)).unwrap();
    }

    let indexer = open(&path);
    assert_eq!(indexer.keys().unwrap(), vec!["bike-1", "bike-2"]);

    let history = indexer.get_all("bike-1", 0).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].value.as_ref(), b"b");
    assert_eq!(history[0].time, t(10));

    assert!(indexer.radius_search(52.52, 13.40, 300.0).unwrap().is_empty());
    let berlin = indexer.radius_search(52.53, 13.41, 300.0).unwrap();
    assert_eq!(berlin.len(), 1);
    assert_eq!(berlin[0].key, "bike-1");

    // writes keep going to the same log after a replay
    indexer.store("bike-2", b"d", 48.15, 11.59, t(6)).unwrap();
    drop(indexer);
    let indexer = open(&path);
    assert_eq!(indexer.get("bike-2").unwrap().unwrap().value.as_ref(), b"d");
}

#[test]
fn test_batched_transaction_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("batch.log");

    {
        let indexer = open(&path);
        let mut tx = indexer.begin();
        for i in 0..5u64 {
            indexer
                .store_tx(&mut tx, &format!("sensor-{}", i), b"", 1.0 + i as f64, 1.0, t(i))
                .unwrap();
        }
        tx.commit().unwrap();

        let mut abandoned = indexer.begin();
        indexer
            .store_tx(&mut abandoned, "ghost", b"", 0.0, 0.0, t(0))
            .unwrap();
        abandoned.discard();
    }

    let indexer = open(&path);
    assert_eq!(indexer.keys().unwrap().len(), 5);
    assert!(indexer.get("ghost").unwrap().is_none());
}

#[test]
fn test_torn_commit_is_dropped_on_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("torn.log");

    {
        let indexer = open(&path);
        indexer.store("dev", b"kept", 10.0, 10.0, t(0)).unwrap();
    }

    // a crash in the middle of appending the next commit
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .unwrap();
    file.write_all(&[0, 0, 0, 3, 0, 0, 0, 0, 9]).unwrap();
    drop(file);

    let indexer = open(&path);
    assert_eq!(indexer.get_all("dev", 0).unwrap().len(), 1);
    indexer.store("dev", b"next", 10.5, 10.5, t(1)).unwrap();
    drop(indexer);

    let indexer = open(&path);
    assert_eq!(indexer.get("dev").unwrap().unwrap().value.as_ref(), b"next");
}

#[test]
fn test_prefixes_share_one_log() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("shared.log");

    {
        let store = MemoryStore::open(&path, SyncPolicy::Always, SyncMode::Data).unwrap();
        let cars = GeoIndexer::new(store.clone(), &Config::default().with_prefix("CARS")).unwrap();
        let boats = GeoIndexer::new(store, &Config::default().with_prefix("BOATS")).unwrap();
        cars.store("x", b"car", 1.0, 1.0, t(0)).unwrap();
        boats.store("x", b"boat", 1.0, 1.0, t(0)).unwrap();
    }

    let store = MemoryStore::open(&path, SyncPolicy::Always, SyncMode::Data).unwrap();
    let cars = GeoIndexer::new(store.clone(), &Config::default().with_prefix("CARS")).unwrap();
    let boats = GeoIndexer::new(store, &Config::default().with_prefix("BOATS")).unwrap();
    assert_eq!(cars.get("x").unwrap().unwrap().value.as_ref(), b"car");
    assert_eq!(boats.radius_search(1.0, 1.0, 100.0).unwrap()[0].value.as_ref(), b"boat");
}

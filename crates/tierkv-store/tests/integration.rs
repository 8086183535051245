//! Integration tests for the tierkv-store crate.
//!
//! These tests drive the public facade end to end: tier selection over
//! real on-disk backends (via tempfile), bulk loading, persistence across
//! sessions and degradation when backends misbehave.

use std::collections::HashMap;
use std::sync::Arc;

use tierkv_store::{
    BackendKind, Database, FileStore, HostEnvironment, IndexedLocation, MapBridge, PersistOp,
    StorageFacade, StoreConfig, SyncStore,
};

fn config_in(dir: &tempfile::TempDir) -> StoreConfig {
    StoreConfig::new().with_data_dir(dir.path())
}

// ═══════════════════════════════════════════════════════════════════════
//  Tier selection
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn sync_store_wins_over_indexed_store() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(&dir);

    let store = StorageFacade::open(&cfg);
    assert_eq!(store.when_ready().await, BackendKind::SyncStore);
    assert_eq!(store.backend_kind(), Some(BackendKind::SyncStore));
}

#[tokio::test]
async fn indexed_store_used_when_sync_store_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(&dir).with_sync_store(false);

    let store = StorageFacade::open(&cfg);
    assert_eq!(store.when_ready().await, BackendKind::IndexedStore);
    assert!(cfg.indexed_store_path().exists());
}

#[tokio::test]
async fn everything_unavailable_falls_back_to_memory() {
    let cfg = StoreConfig::new();
    let store = StorageFacade::open_with(&cfg, HostEnvironment::empty());

    assert_eq!(store.when_ready().await, BackendKind::InMemory);
    assert!(!BackendKind::InMemory.is_persistent());

    store.set("k", "v");
    assert_eq!(store.get("k"), Some("v".to_string()));
    store.remove("k");
    assert_eq!(store.get("k"), None);
    store.set("x", "1");
    store.clear();
    assert!(store.is_empty());
    assert_eq!(store.diagnostics().unavailable(), 3);
}

#[tokio::test]
async fn memory_fallback_is_seeded() {
    let cfg = StoreConfig::new();
    let env = HostEnvironment::empty().with_seed("lang=en; theme=dark%20blue; broken");
    let store = StorageFacade::open_with(&cfg, env);

    assert_eq!(store.when_ready().await, BackendKind::InMemory);
    assert_eq!(store.get("lang"), Some("en".to_string()));
    assert_eq!(store.get("theme"), Some("dark blue".to_string()));
    assert_eq!(store.diagnostics().malformed_entries(), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  Bulk load fidelity
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn sync_store_bulk_load() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(&dir);
    {
        let file = FileStore::open(cfg.sync_store_path(), cfg.sync_store_quota_bytes).unwrap();
        file.set_item("a", "1").unwrap();
        file.set_item("b", "2").unwrap();
    }

    let store = StorageFacade::open(&cfg);
    store.when_ready().await;
    assert_eq!(store.get("a"), Some("1".to_string()));
    assert_eq!(store.get("b"), Some("2".to_string()));
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn indexed_store_bulk_load() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(&dir).with_sync_store(false);
    {
        let db = Database::open_and_migrate(cfg.indexed_store_path()).await.unwrap();
        db.put_entry("a", "1").await.unwrap();
        db.put_entry("b", "2").await.unwrap();
    }

    let store = StorageFacade::open(&cfg);
    assert_eq!(store.when_ready().await, BackendKind::IndexedStore);
    assert_eq!(store.get("a"), Some("1".to_string()));
    assert_eq!(store.get("b"), Some("2".to_string()));
}

#[tokio::test]
async fn bridge_loads_only_well_known_keys() {
    let cfg = StoreConfig::new().with_well_known_keys(["rewards.balance", "rewards.history"]);
    let bridge = Arc::new(MapBridge::with_entries([
        ("x", "9"),
        ("rewards.balance", "120"),
    ]));
    let env = HostEnvironment::empty().with_bridge("NativeBridge", bridge.clone());

    let store = StorageFacade::open_with(&cfg, env);
    assert_eq!(store.when_ready().await, BackendKind::HostBridge);

    // Not in the well-known list, so invisible by contract.
    assert_eq!(store.get("x"), None);
    assert_eq!(store.get("rewards.balance"), Some("120".to_string()));
    assert_eq!(store.get("rewards.history"), None);

    store.set("rewards.history", "[]");
    let snapshot = bridge.snapshot().unwrap();
    assert_eq!(snapshot.get("rewards.history").map(String::as_str), Some("[]"));
}

// ═══════════════════════════════════════════════════════════════════════
//  Persistence across sessions
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn indexed_writes_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(&dir).with_sync_store(false);

    {
        let store = StorageFacade::open(&cfg);
        store.when_ready().await;
        store.set("kept", "yes");
        store.set("dropped", "no");
        store.remove("dropped");
        store.flush().await;
    }

    let store = StorageFacade::open(&cfg);
    store.when_ready().await;
    assert_eq!(store.get("kept"), Some("yes".to_string()));
    assert_eq!(store.get("dropped"), None);
}

#[tokio::test]
async fn sync_writes_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(&dir);

    {
        let store = StorageFacade::open(&cfg);
        store.when_ready().await;
        store.set("count", 3);
    }

    let store = StorageFacade::open(&cfg);
    store.when_ready().await;
    assert_eq!(store.get("count"), Some("3".to_string()));
}

#[tokio::test]
async fn quota_failure_is_absorbed() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(&dir).with_sync_store_quota(64);
    let file: Arc<dyn SyncStore> =
        Arc::new(FileStore::open(cfg.sync_store_path(), cfg.sync_store_quota_bytes).unwrap());
    let env = HostEnvironment::empty().with_sync_store(Arc::clone(&file));

    let store = StorageFacade::open_with(&cfg, env);
    assert_eq!(store.when_ready().await, BackendKind::SyncStore);

    let big = "x".repeat(256);
    store.set("big", &big);

    // The cache keeps the value even though the backend refused it.
    assert_eq!(store.get("big"), Some(big));
    assert_eq!(file.get_item("big").unwrap(), None);
    assert_eq!(store.diagnostics().persistence_failures(PersistOp::Write), 1);
}

#[tokio::test]
async fn indexed_writer_failure_keeps_cached_value() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(&dir).with_sync_store(false);
    let store = StorageFacade::open(&cfg);
    assert_eq!(store.when_ready().await, BackendKind::IndexedStore);

    let db = Database::open(cfg.indexed_store_path()).unwrap();
    db.execute(|conn| {
        conn.execute_batch("DROP TABLE entries;")?;
        Ok(())
    })
    .await
    .unwrap();

    store.set("k", "v");
    store.flush().await;

    assert_eq!(store.get("k"), Some("v".to_string()));
    assert_eq!(store.diagnostics().persistence_failures(PersistOp::Write), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  Cache-first behaviour
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn get_tracks_a_model_map() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(&dir).with_sync_store(false);
    let store = StorageFacade::open(&cfg);
    store.when_ready().await;

    let mut model: HashMap<String, String> = HashMap::new();
    let keys = ["a", "b", "c", "d"];
    for step in 0..200usize {
        let key = keys[step % keys.len()];
        match step % 7 {
            0 | 1 | 2 | 3 => {
                let value = format!("v{step}");
                store.set(key, &value);
                model.insert(key.to_string(), value);
            }
            4 | 5 => {
                store.remove(key);
                model.remove(key);
            }
            _ => {
                store.clear();
                model.clear();
            }
        }
        for k in keys {
            assert_eq!(store.get(k), model.get(k).cloned(), "step {step}, key {k}");
        }
    }
}

#[tokio::test]
async fn clear_twice_is_harmless() {
    let dir = tempfile::tempdir().unwrap();
    let store = StorageFacade::open(&config_in(&dir));
    store.when_ready().await;

    store.set("a", "1");
    store.clear();
    assert!(store.is_empty());
    store.clear();
    assert!(store.is_empty());
    assert_eq!(store.diagnostics().persistence_failures(PersistOp::Clear), 0);
}

#[tokio::test]
async fn bridge_removal_before_readiness_is_not_undone() {
    let cfg = StoreConfig::new().with_well_known_keys(["a", "b"]);
    let bridge = Arc::new(MapBridge::with_entries([("a", "1"), ("b", "2")]));
    let env = HostEnvironment::empty().with_bridge("HostStorage", bridge);
    let store = StorageFacade::open_with(&cfg, env);

    store.set("b", "fresh");
    store.remove("a");
    store.when_ready().await;

    assert_eq!(store.get("a"), None);
    assert_eq!(store.get("b"), Some("fresh".to_string()));
}

#[tokio::test]
async fn clear_before_readiness_discards_loaded_entries() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(&dir);
    {
        let file = FileStore::open(cfg.sync_store_path(), cfg.sync_store_quota_bytes).unwrap();
        file.set_item("a", "1").unwrap();
    }

    let store = StorageFacade::open(&cfg);
    store.clear();
    assert_eq!(store.when_ready().await, BackendKind::SyncStore);
    assert_eq!(store.get("a"), None);
}

#[tokio::test]
async fn reads_work_before_readiness() {
    let cfg = StoreConfig::new();
    let env = HostEnvironment::empty().with_indexed(IndexedLocation::Memory);
    let store = StorageFacade::open_with(&cfg, env);

    // May or may not be ready yet; either way the cache answers.
    store.set("early", "1");
    assert_eq!(store.get("early"), Some("1".to_string()));

    assert_eq!(store.when_ready().await, BackendKind::IndexedStore);
    assert_eq!(store.get("early"), Some("1".to_string()));
}

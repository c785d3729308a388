use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use serde_json::{json, Value};

use offgrid_core::store::SCHEMA_VERSION;
use offgrid_core::{ManualClock, PersistenceStore, StoreError, StoreLocation};

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap())
}

fn open(path: &std::path::Path, clock: &ManualClock) -> PersistenceStore {
    PersistenceStore::new(StoreLocation::File(path.to_path_buf())).with_clock(Arc::new(clock.clone()))
}

#[tokio::test]
async fn drafts_and_cache_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("offline.db");
    let clock = clock();

    {
        let store = open(&path, &clock);
        store.initialize().await.unwrap();
        store
            .save_draft("inspection-7", &json!({"site": "north yard", "checked": [1, 2]}))
            .await
            .unwrap();
        store
            .cache_data_with_ttl("roster", &json!(["ana", "li"]), Duration::from_secs(600))
            .await
            .unwrap();
    }

    let store = open(&path, &clock);
    store.initialize().await.unwrap();

    let draft: Option<Value> = store.get_draft("inspection-7").await.unwrap();
    assert_eq!(draft, Some(json!({"site": "north yard", "checked": [1, 2]})));
    let roster: Option<Vec<String>> = store.get_cached_data("roster").await.unwrap();
    assert_eq!(roster, Some(vec!["ana".to_string(), "li".to_string()]));

    clock.advance(chrono::Duration::minutes(11));
    assert_eq!(store.get_cached_data::<Value>("roster").await.unwrap(), None);
    assert_eq!(store.clear_expired_cache().await.unwrap(), 1);
}

#[tokio::test]
async fn reopening_does_not_reapply_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offline.db");
    let clock = clock();

    for _ in 0..3 {
        let store = open(&path, &clock);
        store.initialize().await.unwrap();
        store.initialize().await.unwrap();
    }

    let conn = Connection::open(&path).unwrap();
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap();
    assert_eq!(version, SCHEMA_VERSION);

    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('drafts', 'cache')",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 2);
}

#[tokio::test]
async fn unusable_location_reports_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path(), &clock());

    match store.get_all_drafts().await {
        Err(StoreError::Unavailable(_)) => {}
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

use rusqlite::{params, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::records::{from_millis, DraftRecord};
use super::{Access, PersistenceStore};
use crate::error::StoreError;

impl PersistenceStore {
    // ===== Drafts =====

    /// Upsert the draft for `id`, stamping it with the current time.
    ///
    /// Resolves once the transaction has committed.
    pub async fn save_draft<T: Serialize + ?Sized>(&self, id: &str, payload: &T) -> Result<(), StoreError> {
        let payload_json = serde_json::to_string(payload).map_err(StoreError::write)?;
        let id = id.to_string();
        let saved_at = self.now_millis();

        self.run(Access::Write, move |conn| {
            let tx = conn.transaction().map_err(StoreError::write)?;
            tx.execute(
                "INSERT INTO drafts (id, payload_json, saved_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET payload_json = excluded.payload_json, saved_at = excluded.saved_at",
                params![id, payload_json, saved_at],
            )
            .map_err(StoreError::write)?;
            tx.commit().map_err(StoreError::write)?;
            debug!(draft = %id, "Draft saved");
            Ok(())
        })
        .await
    }

    /// The payload saved under `id`, or `None` if there is none.
    pub async fn get_draft<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, StoreError> {
        let id = id.to_string();
        let payload_json: Option<String> = self
            .run(Access::Read, move |conn| {
                conn.query_row(
                    "SELECT payload_json FROM drafts WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::read)
            })
            .await?;

        payload_json
            .map(|json| serde_json::from_str(&json).map_err(StoreError::read))
            .transpose()
    }

    /// Every stored draft. No particular order; sort on `saved_at` if it matters.
    pub async fn get_all_drafts(&self) -> Result<Vec<DraftRecord>, StoreError> {
        self.query_drafts("SELECT id, payload_json, saved_at FROM drafts", None)
            .await
    }

    /// Up to `limit` drafts, most recently saved first.
    pub async fn recent_drafts(&self, limit: usize) -> Result<Vec<DraftRecord>, StoreError> {
        self.query_drafts(
            "SELECT id, payload_json, saved_at FROM drafts ORDER BY saved_at DESC LIMIT ?1",
            Some(limit as i64),
        )
        .await
    }

    async fn query_drafts(&self, sql: &'static str, limit: Option<i64>) -> Result<Vec<DraftRecord>, StoreError> {
        let rows: Vec<(String, String, i64)> = self
            .run(Access::Read, move |conn| {
                let mut stmt = conn.prepare(sql).map_err(StoreError::read)?;
                let rows = match limit {
                    Some(limit) => stmt.query_map(params![limit], draft_row),
                    None => stmt.query_map([], draft_row),
                }
                .map_err(StoreError::read)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(StoreError::read)?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, payload_json, saved_at)| {
                Ok(DraftRecord {
                    payload: serde_json::from_str(&payload_json).map_err(StoreError::read)?,
                    saved_at: from_millis(saved_at)?,
                    id,
                })
            })
            .collect()
    }

    /// Remove the draft for `id`. Removing an id that was never saved succeeds.
    pub async fn delete_draft(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.run(Access::Write, move |conn| {
            let removed = conn
                .execute("DELETE FROM drafts WHERE id = ?1", params![id])
                .map_err(StoreError::write)?;
            debug!(draft = %id, removed, "Draft deleted");
            Ok(())
        })
        .await
    }
}

fn draft_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Duration;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    use crate::error::StoreError;
    use crate::store::tests::test_store;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct IncidentForm {
        title: String,
        severity: u8,
        notes: Vec<String>,
    }

    #[tokio::test]
    async fn test_save_then_get_returns_equal_payload() {
        let (store, _clock) = test_store();
        let form = IncidentForm {
            title: "Road washout".to_string(),
            severity: 3,
            notes: vec!["north lane".to_string(), "needs signage".to_string()],
        };

        store.save_draft("incident-7", &form).await.unwrap();
        let loaded: Option<IncidentForm> = store.get_draft("incident-7").await.unwrap();
        assert_eq!(loaded, Some(form));
    }

    #[tokio::test]
    async fn test_missing_draft_is_none() {
        let (store, _clock) = test_store();
        let loaded: Option<Value> = store.get_draft("never-saved").await.unwrap();
        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn test_second_save_overwrites() {
        let (store, clock) = test_store();

        store.save_draft("a", &json!({"step": 1})).await.unwrap();
        let first_saved = store.get_all_drafts().await.unwrap()[0].saved_at;

        clock.advance(Duration::seconds(30));
        store.save_draft("a", &json!({"step": 2})).await.unwrap();

        let all = store.get_all_drafts().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].payload, json!({"step": 2}));
        assert!(all[0].saved_at > first_saved);
        assert_eq!(store.get_draft::<Value>("a").await.unwrap(), Some(json!({"step": 2})));
    }

    #[tokio::test]
    async fn test_recent_drafts_newest_first() {
        let (store, clock) = test_store();
        for id in ["oldest", "middle", "newest"] {
            store.save_draft(id, &json!({"id": id})).await.unwrap();
            clock.advance(Duration::minutes(1));
        }

        let recent = store.recent_drafts(2).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["newest", "middle"]);
    }

    #[tokio::test]
    async fn test_delete_twice_is_ok() {
        let (store, _clock) = test_store();
        store.save_draft("gone", &json!(null)).await.unwrap();

        store.delete_draft("gone").await.unwrap();
        store.delete_draft("gone").await.unwrap();
        assert_eq!(store.get_draft::<Value>("gone").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_read_error() {
        let (store, _clock) = test_store();
        store.save_draft("typed", &json!({"title": 5})).await.unwrap();

        let result = store.get_draft::<IncidentForm>("typed").await;
        assert!(matches!(result, Err(StoreError::Read(_))));
    }

    #[tokio::test]
    async fn test_same_id_writes_apply_in_call_order() {
        let (store, _clock) = test_store();
        store.initialize().await.unwrap();

        let (v1, v2, v3, v4, v5) = (
            json!({"rev": 1}),
            json!({"rev": 2}),
            json!({"rev": 3}),
            json!({"rev": 4}),
            json!({"rev": 5}),
        );
        let (r1, r2, r3, r4, r5) = tokio::join!(
            store.save_draft("a", &v1),
            store.save_draft("a", &v2),
            store.save_draft("a", &v3),
            store.save_draft("a", &v4),
            store.save_draft("a", &v5),
        );
        for result in [r1, r2, r3, r4, r5] {
            result.unwrap();
        }

        assert_eq!(store.get_draft::<Value>("a").await.unwrap(), Some(json!({"rev": 5})));
    }

    #[tokio::test]
    async fn test_save_then_delete_in_one_batch() {
        let (store, _clock) = test_store();
        store.initialize().await.unwrap();

        let value = json!({"rev": 1});
        let (saved, deleted) = tokio::join!(
            store.save_draft("short-lived", &value),
            store.delete_draft("short-lived"),
        );
        saved.unwrap();
        deleted.unwrap();

        assert_eq!(store.get_draft::<Value>("short-lived").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unserializable_payload_is_write_error() {
        let (store, _clock) = test_store();
        let mut grid = HashMap::new();
        grid.insert((0u8, 1u8), 7u8);

        let result = store.save_draft("grid", &grid).await;
        assert!(matches!(result, Err(StoreError::Write(_))));
        assert!(store.get_all_drafts().await.unwrap().is_empty());
    }
}

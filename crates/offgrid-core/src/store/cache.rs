use std::time::Duration;

use rusqlite::{params, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use super::records::{from_millis, is_expired, CacheEntry, StoreStats};
use super::{Access, PersistenceStore};
use crate::error::StoreError;

/// Number of expired keys pulled from the expiry index per sweep step.
const SWEEP_BATCH_SIZE: i64 = 256;

impl PersistenceStore {
    // ===== Cache =====

    /// Cache `value` under `key` for the store's default TTL.
    pub async fn cache_data<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.cache_data_with_ttl(key, value, self.default_ttl).await
    }

    /// Cache `value` under `key` until `now + ttl`. A zero TTL stores an entry
    /// that is already expired.
    pub async fn cache_data_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let value_json = serde_json::to_string(value).map_err(StoreError::write)?;
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = self.now_millis().saturating_add(ttl_ms);
        let key = key.to_string();

        self.run(Access::Write, move |conn| {
            let tx = conn.transaction().map_err(StoreError::write)?;
            tx.execute(
                "INSERT INTO cache (key, value_json, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, expires_at = excluded.expires_at",
                params![key, value_json, expires_at],
            )
            .map_err(StoreError::write)?;
            tx.commit().map_err(StoreError::write)?;
            debug!(cache = %key, expires_at, "Cache entry stored");
            Ok(())
        })
        .await
    }

    /// The live entry for `key`. Entries at or past their expiry read as `None`
    /// even before a sweep removes them.
    pub async fn get_cache_entry(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let now = from_millis(self.now_millis())?;
        let key = key.to_string();

        let row: Option<(String, String, i64)> = self
            .run(Access::Read, move |conn| {
                conn.query_row(
                    "SELECT key, value_json, expires_at FROM cache WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .map_err(StoreError::read)
            })
            .await?;

        let Some((key, value_json, expires_at)) = row else {
            return Ok(None);
        };
        let expires_at = from_millis(expires_at)?;
        if is_expired(expires_at, now) {
            debug!(cache = %key, "Cache entry expired");
            return Ok(None);
        }

        Ok(Some(CacheEntry {
            value: serde_json::from_str(&value_json).map_err(StoreError::read)?,
            expires_at,
            key,
        }))
    }

    /// The cached value for `key`, or `None` if absent or expired.
    pub async fn get_cached_data<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.get_cache_entry(key)
            .await?
            .map(|entry| serde_json::from_value(entry.value).map_err(StoreError::read))
            .transpose()
    }

    /// Drop a single cache entry. Missing keys are not an error.
    pub async fn remove_cached_data(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.run(Access::Write, move |conn| {
            conn.execute("DELETE FROM cache WHERE key = ?1", params![key])
                .map_err(StoreError::write)?;
            Ok(())
        })
        .await
    }

    /// Delete every cache entry with `expires_at <= now`, returning how many
    /// were removed. Live entries are untouched.
    ///
    /// Walks the expiry index from the oldest entry up to `now` in batches,
    /// deleting as it goes, until no expired keys remain. The whole sweep is
    /// one transaction.
    pub async fn clear_expired_cache(&self) -> Result<usize, StoreError> {
        let now = self.now_millis();

        let removed = self
            .run(Access::Write, move |conn| {
                let tx = conn.transaction().map_err(StoreError::write)?;
                let mut removed = 0usize;
                {
                    let mut select = tx
                        .prepare("SELECT key FROM cache WHERE expires_at <= ?1 ORDER BY expires_at LIMIT ?2")
                        .map_err(StoreError::write)?;
                    let mut delete = tx
                        .prepare("DELETE FROM cache WHERE key = ?1")
                        .map_err(StoreError::write)?;

                    loop {
                        let batch = select
                            .query_map(params![now, SWEEP_BATCH_SIZE], |row| row.get::<_, String>(0))
                            .map_err(StoreError::write)?
                            .collect::<Result<Vec<_>, _>>()
                            .map_err(StoreError::write)?;
                        if batch.is_empty() {
                            break;
                        }
                        for key in &batch {
                            removed += delete.execute(params![key]).map_err(StoreError::write)?;
                        }
                    }
                }
                tx.commit().map_err(StoreError::write)?;
                Ok(removed)
            })
            .await?;

        if removed > 0 {
            info!(removed, "Swept expired cache entries");
        } else {
            debug!("No expired cache entries");
        }
        Ok(removed)
    }

    /// Counts of drafts, cache entries and not-yet-swept expired entries.
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let now = self.now_millis();
        self.run(Access::Read, move |conn| {
            let count = |sql: &str, args: &[&dyn rusqlite::ToSql]| -> Result<u64, StoreError> {
                conn.query_row(sql, args, |row| row.get::<_, i64>(0))
                    .map(|n| n.max(0) as u64)
                    .map_err(StoreError::read)
            };
            Ok(StoreStats {
                drafts: count("SELECT COUNT(*) FROM drafts", &[])?,
                cache_entries: count("SELECT COUNT(*) FROM cache", &[])?,
                expired_entries: count("SELECT COUNT(*) FROM cache WHERE expires_at <= ?1", &[&now as &dyn rusqlite::ToSql])?,
            })
        })
        .await
    }
}

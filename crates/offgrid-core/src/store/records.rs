use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// A saved form/document state. One record per id; later saves overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRecord {
    pub id: String,
    pub payload: Value,
    pub saved_at: DateTime<Utc>,
}

/// A cached value with an absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// An entry is dead from the instant `expires_at` is reached, swept or not.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        is_expired(self.expires_at, now)
    }
}

/// Expiry boundary shared by reads and the sweep: `expires_at <= now` is dead.
pub(crate) fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at <= now
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub drafts: u64,
    pub cache_entries: u64,
    /// Entries past expiry that a sweep has not reaped yet
    pub expired_entries: u64,
}

pub(crate) fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::read(format!("timestamp out of range: {}", millis)))
}

use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;

struct Migration {
    version: i64,
    sql: &'static str,
}

/// Schema version the store expects after opening.
pub const SCHEMA_VERSION: i64 = 1;

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: r#"
CREATE TABLE drafts (
    id            TEXT PRIMARY KEY,
    payload_json  TEXT NOT NULL,
    saved_at      INTEGER NOT NULL
);

CREATE INDEX idx_drafts_saved_at ON drafts(saved_at);

CREATE TABLE cache (
    key           TEXT PRIMARY KEY,
    value_json    TEXT NOT NULL,
    expires_at    INTEGER NOT NULL
);

CREATE INDEX idx_cache_expires_at ON cache(expires_at);
"#,
}];

fn schema_version(conn: &Connection) -> Result<i64, StoreError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(StoreError::unavailable)
}

/// Bring the schema up to [`SCHEMA_VERSION`]. Already-applied steps are skipped,
/// so reopening an existing database is a no-op.
pub(super) fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    let current = schema_version(conn)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        info!(version = migration.version, "Applying store migration");

        let tx = conn.transaction().map_err(StoreError::unavailable)?;
        tx.execute_batch(migration.sql)
            .map_err(|e| StoreError::unavailable(format!("migration v{}: {e}", migration.version)))?;
        tx.pragma_update(None, "user_version", migration.version)
            .map_err(StoreError::unavailable)?;
        tx.commit().map_err(StoreError::unavailable)?;
    }

    Ok(())
}

//! Durable local storage for drafts and expiring cache entries.
//!
//! This module provides the `PersistenceStore`, a transactional store with
//! two collections:
//! - `drafts`: caller-keyed documents, indexed by when they were saved
//! - `cache`: values with an absolute expiry, indexed by expiry time
//!
//! A store owns exactly one database connection. It is opened lazily on first
//! use (or explicitly via `initialize`) and kept for the life of the store.
//! Operations are queued on that connection in call order, so writes to the
//! same key land last-write-wins.

mod cache;
mod drafts;
mod migrations;
pub mod records;
mod sweeper;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

pub use migrations::SCHEMA_VERSION;
pub use records::{CacheEntry, DraftRecord, StoreStats};
pub use sweeper::spawn_sweeper;

/// TTL applied by `cache_data` when the caller does not pass one.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Where the backing database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    InMemory,
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl Access {
    fn fail(self, err: impl std::fmt::Display) -> StoreError {
        match self {
            Access::Read => StoreError::read(err),
            Access::Write => StoreError::write(err),
        }
    }
}

pub struct PersistenceStore {
    location: StoreLocation,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    conn: OnceCell<Arc<Mutex<Connection>>>,
}

impl PersistenceStore {
    pub fn new(location: StoreLocation) -> Self {
        Self {
            location,
            clock: Arc::new(SystemClock),
            default_ttl: DEFAULT_CACHE_TTL,
            conn: OnceCell::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(StoreLocation::InMemory)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn is_initialized(&self) -> bool {
        self.conn.initialized()
    }

    /// Open (creating on first run) the database and bring its schema up to date.
    ///
    /// Safe to call repeatedly: the connection is opened once and reused, and
    /// migrations already applied are skipped.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        self.connection().await.map(|_| ())
    }

    async fn connection(&self) -> Result<&Arc<Mutex<Connection>>, StoreError> {
        self.conn
            .get_or_try_init(|| async {
                let location = self.location.clone();
                let conn = tokio::task::spawn_blocking(move || open_connection(&location))
                    .await
                    .map_err(|e| StoreError::unavailable(format!("open task failed: {e}")))??;
                Ok::<_, StoreError>(Arc::new(Mutex::new(conn)))
            })
            .await
    }

    /// Run `op` against the connection on the blocking pool.
    ///
    /// The connection lock is taken before handing off, so operations run in
    /// the order callers reached this point.
    async fn run<T, F>(&self, access: Access, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(self.connection().await?);
        let mut guard = conn.lock_owned().await;
        tokio::task::spawn_blocking(move || op(&mut *guard))
            .await
            .map_err(|e| access.fail(format!("storage task failed: {e}")))?
    }

    pub(crate) fn now_millis(&self) -> i64 {
        records::to_millis(self.clock.now())
    }
}

fn open_connection(location: &StoreLocation) -> Result<Connection, StoreError> {
    let mut conn = match location {
        StoreLocation::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::unavailable(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
            debug!(path = %path.display(), "Opening store database");
            let conn = Connection::open(path).map_err(StoreError::unavailable)?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")
                .map_err(StoreError::unavailable)?;
            conn
        }
        StoreLocation::InMemory => Connection::open_in_memory().map_err(StoreError::unavailable)?,
    };

    migrations::run_migrations(&mut conn)?;
    info!(location = ?location, "Store ready");
    Ok(conn)
}

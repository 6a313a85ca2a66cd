#![forbid(unsafe_code)]

mod error;
mod outbox;
mod projects;
mod reconcile;
mod schema;
mod snapshots;
mod support;
mod testcases;
mod trials;
mod types;
mod workspaces;

pub use error::StoreError;
pub use types::*;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DB_FILE_NAME: &str = "regress.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_LIST_LIMIT: usize = 1_000;

/// Durable entity store. Every public mutation runs in a single transaction:
/// the reconciler's cascades either land completely or not at all.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE_NAME);
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::install(&conn)?;

        tracing::debug!(path = %db_path.display(), "opened store");
        Ok(Self { conn, storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

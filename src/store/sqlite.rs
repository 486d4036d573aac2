//! SQLite-backed overflow store.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::stored::StoredAggregate;
use super::OverflowStore;
use crate::error::{RankError, Result};
use crate::model::aggregate::DomainAggregate;

/// Schema DDL run on open.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS aggregates (
    domain TEXT PRIMARY KEY,
    value BLOB NOT NULL
);
";

const SELECT_ONE: &str = "SELECT value FROM aggregates WHERE domain = ?1";

const UPSERT: &str = "INSERT INTO aggregates (domain, value) VALUES (?1, ?2)
    ON CONFLICT(domain) DO UPDATE SET value = excluded.value";

/// Overflow store in a local SQLite database.
///
/// Durability is relaxed (`synchronous = OFF`): the contents are scratch data
/// that every run clears on entry.
pub struct SqliteStore {
    path: PathBuf,
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let init_err = |reason: String| RankError::StoreInitialization {
            path: path.clone(),
            reason,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| init_err(e.to_string()))?;
            }
        }
        let conn = Connection::open(&path).map_err(|e| init_err(e.to_string()))?;
        Self::prepare(&conn).map_err(|e| init_err(e.to_string()))?;

        info!(path = %path.display(), "Opened overflow store");
        Ok(Self { path, conn })
    }

    /// A private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let path = PathBuf::from(":memory:");
        let init_err = |e: rusqlite::Error| RankError::StoreInitialization {
            path: path.clone(),
            reason: e.to_string(),
        };
        let conn = Connection::open_in_memory().map_err(init_err)?;
        Self::prepare(&conn).map_err(init_err)?;
        Ok(Self { path, conn })
    }

    fn prepare(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch("PRAGMA synchronous = OFF;")?;
        conn.execute_batch(SCHEMA)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_err(e: impl std::fmt::Display) -> RankError {
    RankError::StoreRead(e.to_string())
}

fn write_err(domains: usize, e: impl std::fmt::Display) -> RankError {
    RankError::StoreWrite {
        domains,
        reason: e.to_string(),
    }
}

impl OverflowStore for SqliteStore {
    fn get(&mut self, domain: &str) -> Result<Option<StoredAggregate>> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(SELECT_ONE, params![domain], |row| row.get(0))
            .optional()
            .map_err(read_err)?;
        bytes
            .map(|b| StoredAggregate::decode(&b))
            .transpose()
            .map_err(read_err)
    }

    fn put(&mut self, domain: &str, value: &StoredAggregate) -> Result<()> {
        let bytes = value.encode().map_err(|e| write_err(1, e))?;
        self.conn
            .execute(UPSERT, params![domain, bytes])
            .map_err(|e| write_err(1, e))?;
        Ok(())
    }

    fn get_all(&mut self) -> Result<Vec<(String, StoredAggregate)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT domain, value FROM aggregates")
            .map_err(read_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(read_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (domain, bytes) = row.map_err(read_err)?;
            let value = StoredAggregate::decode(&bytes)
                .map_err(|e| read_err(format!("{domain}: {e}")))?;
            out.push((domain, value));
        }
        debug!(entries = out.len(), "Read back overflow store");
        Ok(out)
    }

    fn clear(&mut self) -> Result<()> {
        self.conn
            .execute("DELETE FROM aggregates", [])
            .map_err(|e| write_err(0, e))?;
        Ok(())
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }

    fn is_transactional(&self) -> bool {
        true
    }

    /// One transaction per sub-batch: all of it lands, or none of it.
    fn merge_chunk(&mut self, chunk: Vec<(String, DomainAggregate)>) -> Result<()> {
        let len = chunk.len();
        let tx = self.conn.transaction().map_err(|e| write_err(len, e))?;
        {
            let mut select = tx.prepare_cached(SELECT_ONE).map_err(|e| write_err(len, e))?;
            let mut upsert = tx.prepare_cached(UPSERT).map_err(|e| write_err(len, e))?;
            for (domain, incoming) in chunk {
                let existing: Option<Vec<u8>> = select
                    .query_row(params![domain], |row| row.get(0))
                    .optional()
                    .map_err(|e| write_err(len, e))?;
                let merged = match existing {
                    Some(bytes) => StoredAggregate::decode(&bytes)
                        .map_err(|e| write_err(len, e))?
                        .into_aggregate()
                        .merged(incoming),
                    None => incoming,
                };
                let bytes = StoredAggregate::from(&merged)
                    .encode()
                    .map_err(|e| write_err(len, e))?;
                upsert
                    .execute(params![domain, bytes])
                    .map_err(|e| write_err(len, e))?;
            }
        }
        tx.commit().map_err(|e| write_err(len, e))?;
        Ok(())
    }
}

/// Default store location for a source file.
///
/// Example: `~/.cache/mboxrank/overflow-<sha256_of_path>.sqlite`
pub fn store_path_for(source_path: &Path, cache_dir: &Path) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(source_path.to_string_lossy().as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    cache_dir.join(format!("overflow-{hash}.sqlite"))
}

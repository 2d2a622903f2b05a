//! SQLite-backed Store implementation
//!
//! One table pair per collection: `records_{name}` holds the serialized
//! record plus a monotonically increasing `version`; `index_{name}` holds the
//! record's indexed fields for list queries. Updates take the version the
//! writer read and fail with [`StoreError::Conflict`] when the row has moved
//! on, so concurrent writers to the same record never lose each other's
//! changes.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::debug;

use crate::record::{Filter, FilterOp, Record};

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Duplicate(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("version conflict on {id}: expected {expected}, found {found}")]
    Conflict { id: String, expected: i64, found: i64 },

    #[error("invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("store lock poisoned")]
    Lock,

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A record together with the version it was read at
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub record: T,
    pub version: i64,
}

/// SQLite-backed record store
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create a store in the given directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = path.as_ref();
        debug!(path = %dir.display(), "Store::open: called");
        std::fs::create_dir_all(dir)?;

        let conn = Connection::open(dir.join("store.db"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }

    /// Create a new record; fails with `Duplicate` if the id is taken
    pub fn create<T: Record>(&self, record: &T) -> Result<String, StoreError> {
        let collection = checked_collection::<T>()?;
        let id = record.id().to_string();
        debug!(%collection, %id, "Store::create: called");

        let mut conn = self.conn()?;
        ensure_collection(&conn, collection)?;
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                &format!("SELECT 1 FROM records_{collection} WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::Duplicate(id));
        }

        let data = serde_json::to_string(record)?;
        tx.execute(
            &format!("INSERT INTO records_{collection} (id, version, updated_at, data) VALUES (?1, 1, ?2, ?3)"),
            params![id, record.updated_at(), data],
        )?;
        write_index(&tx, collection, record)?;
        tx.commit()?;

        Ok(id)
    }

    /// Get a record by id
    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.get_with_version(id)?.map(|v| v.record))
    }

    /// Get a record by id together with its current version
    pub fn get_with_version<T: Record>(&self, id: &str) -> Result<Option<Versioned<T>>, StoreError> {
        let collection = checked_collection::<T>()?;
        debug!(%collection, %id, "Store::get_with_version: called");

        let conn = self.conn()?;
        ensure_collection(&conn, collection)?;

        let row: Option<(i64, String)> = conn
            .query_row(
                &format!("SELECT version, data FROM records_{collection} WHERE id = ?1"),
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((version, data)) => {
                let record: T = serde_json::from_str(&data)?;
                Ok(Some(Versioned { record, version }))
            }
            None => Ok(None),
        }
    }

    /// Update a record, enforcing the version the writer read
    ///
    /// Returns the new version on success. A stale `expected_version` yields
    /// `Conflict`; the caller should re-read and retry the whole operation.
    pub fn update<T: Record>(&self, record: &T, expected_version: i64) -> Result<i64, StoreError> {
        let collection = checked_collection::<T>()?;
        let id = record.id().to_string();
        debug!(%collection, %id, expected_version, "Store::update: called");

        let mut conn = self.conn()?;
        ensure_collection(&conn, collection)?;
        let tx = conn.transaction()?;

        let found: Option<i64> = tx
            .query_row(
                &format!("SELECT version FROM records_{collection} WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let found = found.ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if found != expected_version {
            debug!(%id, expected_version, found, "Store::update: version conflict");
            return Err(StoreError::Conflict {
                id,
                expected: expected_version,
                found,
            });
        }

        let new_version = expected_version + 1;
        let data = serde_json::to_string(record)?;
        tx.execute(
            &format!(
                "UPDATE records_{collection} SET version = ?1, updated_at = ?2, data = ?3 WHERE id = ?4 AND version = ?5"
            ),
            params![new_version, record.updated_at(), data, id, expected_version],
        )?;
        tx.execute(
            &format!("DELETE FROM index_{collection} WHERE record_id = ?1"),
            params![id],
        )?;
        write_index(&tx, collection, record)?;
        tx.commit()?;

        Ok(new_version)
    }

    /// List records matching all the given filters (empty slice = all)
    pub fn list<T: Record>(&self, filters: &[Filter]) -> Result<Vec<T>, StoreError> {
        let collection = checked_collection::<T>()?;
        debug!(%collection, filter_count = filters.len(), "Store::list: called");

        let conn = self.conn()?;
        ensure_collection(&conn, collection)?;

        let ids = match filters {
            [] => None,
            _ => Some(matching_ids(&conn, collection, filters)?),
        };

        let mut stmt = conn.prepare(&format!("SELECT id, data FROM records_{collection} ORDER BY id"))?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut records = Vec::new();
        for row in rows {
            let (id, data) = row?;
            if let Some(ref ids) = ids
                && !ids.contains(&id)
            {
                continue;
            }
            records.push(serde_json::from_str(&data)?);
        }
        Ok(records)
    }

    /// Delete a record by id
    pub fn delete<T: Record>(&self, id: &str) -> Result<(), StoreError> {
        let collection = checked_collection::<T>()?;
        debug!(%collection, %id, "Store::delete: called");

        let mut conn = self.conn()?;
        ensure_collection(&conn, collection)?;
        let tx = conn.transaction()?;

        tx.execute(
            &format!("DELETE FROM index_{collection} WHERE record_id = ?1"),
            params![id],
        )?;
        let deleted = tx.execute(&format!("DELETE FROM records_{collection} WHERE id = ?1"), params![id])?;
        tx.commit()?;

        if deleted == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Rewrite the index rows for every record in the collection
    ///
    /// Run at startup so list queries see index entries even for records
    /// written by an older schema. Returns the number of records indexed.
    pub fn rebuild_indexes<T: Record>(&self) -> Result<usize, StoreError> {
        let collection = checked_collection::<T>()?;
        debug!(%collection, "Store::rebuild_indexes: called");

        let mut conn = self.conn()?;
        ensure_collection(&conn, collection)?;
        let tx = conn.transaction()?;

        let records: Vec<(String, String)> = {
            let mut stmt = tx.prepare(&format!("SELECT id, data FROM records_{collection}"))?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<_, _>>()?
        };

        tx.execute(&format!("DELETE FROM index_{collection}"), [])?;
        let mut count = 0;
        for (_, data) in &records {
            let record: T = serde_json::from_str(data)?;
            write_index(&tx, collection, &record)?;
            count += 1;
        }
        tx.commit()?;

        Ok(count)
    }
}

/// Validate the collection name before it is spliced into SQL
fn checked_collection<T: Record>() -> Result<&'static str, StoreError> {
    let name = T::collection_name();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(StoreError::InvalidCollection(name.to_string()));
    }
    Ok(name)
}

fn ensure_collection(conn: &Connection, collection: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS records_{collection} (
            id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            data TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS index_{collection} (
            record_id TEXT NOT NULL,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (record_id, field)
        );"
    ))?;
    Ok(())
}

fn write_index<T: Record>(conn: &Connection, collection: &str, record: &T) -> Result<(), StoreError> {
    for (field, value) in record.indexed_fields() {
        conn.execute(
            &format!("INSERT OR REPLACE INTO index_{collection} (record_id, field, value) VALUES (?1, ?2, ?3)"),
            params![record.id(), field, value.as_text()],
        )?;
    }
    Ok(())
}

/// Resolve the id set matching every filter (intersection)
fn matching_ids(conn: &Connection, collection: &str, filters: &[Filter]) -> Result<HashSet<String>, StoreError> {
    let mut result: Option<HashSet<String>> = None;

    for filter in filters {
        let FilterOp::Eq = filter.op;
        let mut stmt = conn.prepare(&format!(
            "SELECT record_id FROM index_{collection} WHERE field = ?1 AND value = ?2"
        ))?;
        let rows = stmt.query_map(params![filter.field, filter.value.as_text()], |row| {
            row.get::<_, String>(0)
        })?;
        let ids: HashSet<String> = rows.collect::<Result<_, _>>()?;

        result = Some(match result {
            None => ids,
            Some(prev) => prev.intersection(&ids).cloned().collect(),
        });
    }

    Ok(result.unwrap_or_default())
}

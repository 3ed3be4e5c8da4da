//! SQLite storage implementation

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::UrlRegistry;
use super::schema;
use crate::record::{HistoryRecord, NewHistory, NewUrl, UrlRecord};
use crate::{Error, Result};

/// Default time a statement waits on a locked database file.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Insert-or-update keyed by the unique index on `url`. The id comes back
/// from the same statement, for both the inserted and the updated row.
const UPSERT_URL: &str = r#"
INSERT INTO urls_tab (url, interval) VALUES (?1, ?2)
ON CONFLICT(url) DO UPDATE SET interval = excluded.interval
RETURNING id
"#;

/// Outcome of schema initialization when opening a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatus {
    Ready,
    /// The file already existed and its schema could not be brought up to
    /// date. The store is usable but individual operations may fail.
    Degraded(String),
}

/// SQLite-backed registry and history store
///
/// A single connection is shared behind a mutex, so every operation runs
/// against a consistent view and no two writes interleave.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist).
    /// Any schema failure is an error.
    pub fn open(path: &Path) -> Result<Self> {
        match Self::connect(path, DEFAULT_BUSY_TIMEOUT)? {
            (store, SchemaStatus::Ready) => Ok(store),
            (_, SchemaStatus::Degraded(reason)) => Err(Error::Schema(reason)),
        }
    }

    /// Open a database file for a long-running service.
    ///
    /// Failing to open the file is an error. Failing to create the schema is
    /// an error only for a freshly created file; for a file that already
    /// existed the store is returned with [`SchemaStatus::Degraded`].
    pub fn connect(path: &Path, busy_timeout: Duration) -> Result<(Self, SchemaStatus)> {
        let fresh = !path.exists();
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let store = Self {
            conn: Mutex::new(conn),
        };

        match store.initialize_schema() {
            Ok(()) => Ok((store, SchemaStatus::Ready)),
            Err(e) if fresh => {
                // Opening created the file; leave nothing behind so the next
                // start still treats it as fresh.
                drop(store);
                if let Err(rm) = std::fs::remove_file(path) {
                    tracing::warn!("Could not remove {}: {}", path.display(), rm);
                }
                Err(Error::Schema(e.to_string()))
            }
            Err(e) => {
                tracing::error!(
                    "Schema initialization failed for existing database {}: {}",
                    path.display(),
                    e
                );
                Ok((store, SchemaStatus::Degraded(e.to_string())))
            }
        }
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema. Safe to run on every start.
    ///
    /// A `urls_tab` left by an older service without AUTOINCREMENT is rebuilt
    /// in place before the indexes are created.
    pub fn initialize_schema(&self) -> Result<()> {
        let mut conn = self.lock()?;
        for stmt in schema::CREATE_TABLES {
            conn.execute(stmt, [])?;
        }

        let urls_sql: String = conn.query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'urls_tab'",
            [],
            |row| row.get(0),
        )?;
        if !schema::has_autoincrement(&urls_sql) {
            tracing::info!("Migrating urls_tab to AUTOINCREMENT ids");
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute_batch(schema::MIGRATE_URLS_TO_AUTOINCREMENT)?;
            tx.commit()?;
        }

        for stmt in schema::CREATE_INDEXES {
            conn.execute(stmt, [])?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Task("connection mutex poisoned".to_string()))
    }

    // ========== URL Operations ==========

    /// Register a URL or update the interval of its existing row
    pub fn upsert_url(&self, new: &NewUrl) -> Result<i64> {
        new.validate()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id: i64 = tx.query_row(UPSERT_URL, params![new.url, new.interval], |row| row.get(0))?;
        tx.commit()?;

        tracing::debug!("Upserted {} (interval {}s) as id {}", new.url, new.interval, id);
        Ok(id)
    }

    /// Delete a URL by id. Returns false when no such row existed.
    pub fn delete_url(&self, id: i64) -> Result<bool> {
        let removed = self
            .lock()?
            .execute("DELETE FROM urls_tab WHERE id = ?1", [id])?;
        if removed == 0 {
            tracing::debug!("Delete of unknown id {} ignored", id);
        }
        Ok(removed > 0)
    }

    /// Get a URL by id
    pub fn get_url(&self, id: i64) -> Result<Option<UrlRecord>> {
        self.lock()?
            .query_row(
                "SELECT id, url, interval FROM urls_tab WHERE id = ?1",
                [id],
                row_to_url,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get a URL by its exact text
    pub fn find_url(&self, url: &str) -> Result<Option<UrlRecord>> {
        self.lock()?
            .query_row(
                "SELECT id, url, interval FROM urls_tab WHERE url = ?1",
                [url],
                row_to_url,
            )
            .optional()
            .map_err(Into::into)
    }

    /// All registered URLs, in id order
    pub fn list_urls(&self) -> Result<Vec<UrlRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, url, interval FROM urls_tab ORDER BY id")?;
        let urls = stmt
            .query_map([], row_to_url)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(urls)
    }

    /// Count all registered URLs
    pub fn count_urls(&self) -> Result<usize> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM urls_tab", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== History Operations ==========

    /// Append one fetch result
    pub fn insert_history(&self, entry: &NewHistory) -> Result<()> {
        entry.validate()?;

        self.lock()?.execute(
            r#"
            INSERT INTO urls_history_tab (id, response, duration, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                entry.id,
                entry.response,
                entry.duration,
                format_timestamp(&entry.created_at),
            ],
        )?;
        Ok(())
    }

    /// Walk the history of `id` oldest first without collecting it.
    /// Returns the number of rows visited. `visit` runs while the connection
    /// is held and must not call back into the store.
    pub fn for_each_history<F>(&self, id: i64, mut visit: F) -> Result<usize>
    where
        F: FnMut(HistoryRecord) -> Result<()>,
    {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, response, duration, created_at FROM urls_history_tab
            WHERE id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )?;

        let mut visited = 0;
        for row in stmt.query_map([id], row_to_history)? {
            visit(row?)?;
            visited += 1;
        }
        Ok(visited)
    }

    /// History of `id`, oldest first
    pub fn get_history(&self, id: i64) -> Result<Vec<HistoryRecord>> {
        let mut records = Vec::new();
        self.for_each_history(id, |record| {
            records.push(record);
            Ok(())
        })?;
        Ok(records)
    }

    /// Count all history rows
    pub fn count_history(&self) -> Result<usize> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM urls_history_tab", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Statistics ==========

    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            urls: self.count_urls()?,
            history: self.count_history()?,
        })
    }
}

impl UrlRegistry for SqliteStore {
    fn upsert(&self, new: &NewUrl) -> Result<i64> {
        self.upsert_url(new)
    }

    fn delete(&self, id: i64) -> Result<bool> {
        self.delete_url(id)
    }

    fn get(&self, id: i64) -> Result<Option<UrlRecord>> {
        self.get_url(id)
    }

    fn list(&self) -> Result<Vec<UrlRecord>> {
        self.list_urls()
    }

    fn append_history(&self, entry: &NewHistory) -> Result<()> {
        self.insert_history(entry)
    }

    fn history(&self, id: i64) -> Result<Vec<HistoryRecord>> {
        self.get_history(id)
    }
}

/// Timestamps are stored as fixed-width RFC 3339 UTC text so that text order
/// matches time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_url(row: &rusqlite::Row) -> rusqlite::Result<UrlRecord> {
    Ok(UrlRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        interval: row.get(2)?,
    })
}

fn row_to_history(row: &rusqlite::Row) -> rusqlite::Result<HistoryRecord> {
    let created_at: String = row.get(3)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);

    Ok(HistoryRecord {
        id: row.get(0)?,
        response: row.get(1)?,
        duration: row.get(2)?,
        created_at,
    })
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DbStats {
    pub urls: usize,
    pub history: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  URLs: {}", self.urls)?;
        writeln!(f, "  History entries: {}", self.history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn entry(id: i64, response: &str, secs: i64) -> NewHistory {
        NewHistory {
            id,
            response: response.to_string(),
            duration: 0.25,
            created_at: at(secs),
        }
    }

    #[test]
    fn test_registry_scenario() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert_eq!(store.upsert_url(&NewUrl::new("http://x", 30)).unwrap(), 1);
        assert_eq!(store.upsert_url(&NewUrl::new("http://y", 60)).unwrap(), 2);
        assert_eq!(store.upsert_url(&NewUrl::new("http://x", 45)).unwrap(), 1);

        let urls = store.list_urls().unwrap();
        assert_eq!(urls.len(), 2);
        let x = store.get_url(1).unwrap().unwrap();
        assert_eq!(x.url, "http://x");
        assert_eq!(x.interval, 45);

        assert!(store.delete_url(1).unwrap());
        let urls = store.list_urls().unwrap();
        assert_eq!(urls, vec![UrlRecord { id: 2, url: "http://y".into(), interval: 60 }]);
    }

    #[test]
    fn test_upsert_then_list_has_single_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_url(&NewUrl::new("http://a", 10)).unwrap();
        store.upsert_url(&NewUrl::new("http://b", 10)).unwrap();

        let matching: Vec<_> = store
            .list_urls()
            .unwrap()
            .into_iter()
            .filter(|r| r.url == "http://a")
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].interval, 10);
    }

    #[test]
    fn test_reregister_keeps_id_and_updates_interval() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.upsert_url(&NewUrl::new("http://a", 10)).unwrap();
        let second = store.upsert_url(&NewUrl::new("http://a", 99)).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count_urls().unwrap(), 1);
        assert_eq!(store.find_url("http://a").unwrap().unwrap().interval, 99);
    }

    #[test]
    fn test_upsert_rejects_invalid_input() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.upsert_url(&NewUrl::new("", 10)),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.upsert_url(&NewUrl::new("http://a", 0)),
            Err(Error::Validation(_))
        ));
        assert_eq!(store.count_urls().unwrap(), 0);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.upsert_url(&NewUrl::new("http://a", 10)).unwrap();

        assert!(store.delete_url(id).unwrap());
        assert!(!store.delete_url(id).unwrap());
        assert!(!store.delete_url(12345).unwrap());
        assert!(store.list_urls().unwrap().is_empty());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.upsert_url(&NewUrl::new("http://a", 10)).unwrap();
        store.delete_url(a).unwrap();
        let b = store.upsert_url(&NewUrl::new("http://b", 10)).unwrap();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_concurrent_first_upserts_create_one_row() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());

        let handles: Vec<_> = (1..=8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.upsert_url(&NewUrl::new("http://race", i)).unwrap())
            })
            .collect();
        let ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(ids.iter().all(|id| *id == ids[0]));
        let urls = store.list_urls().unwrap();
        assert_eq!(urls.len(), 1);
        assert!((1..=8).contains(&urls[0].interval));
    }

    #[test]
    fn test_concurrent_upserts_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        SqliteStore::open(&path).unwrap();

        let stores: Vec<_> = (0..4).map(|_| SqliteStore::open(&path).unwrap()).collect();
        let handles: Vec<_> = stores
            .into_iter()
            .zip(1..)
            .map(|(store, i)| {
                std::thread::spawn(move || store.upsert_url(&NewUrl::new("http://shared", i)).unwrap())
            })
            .collect();
        let ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(SqliteStore::open(&path).unwrap().count_urls().unwrap(), 1);
    }

    #[test]
    fn test_history_empty_for_unknown_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_history(42).unwrap().is_empty());
    }

    #[test]
    fn test_history_is_ordered_by_created_at() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.upsert_url(&NewUrl::new("http://a", 10)).unwrap();

        store.insert_history(&entry(id, "third", 30)).unwrap();
        store.insert_history(&entry(id, "first", 10)).unwrap();
        store.insert_history(&entry(id, "second", 20)).unwrap();
        store.insert_history(&entry(id + 1, "other", 5)).unwrap();

        let history = store.get_history(id).unwrap();
        let responses: Vec<_> = history.iter().map(|h| h.response.as_str()).collect();
        assert_eq!(responses, vec!["first", "second", "third"]);
        assert_eq!(history[0].created_at, at(10));
        assert!((history[0].duration - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_history_accepts_unregistered_id_and_survives_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_history(&entry(77, "orphan", 0)).unwrap();
        assert_eq!(store.get_history(77).unwrap().len(), 1);

        let id = store.upsert_url(&NewUrl::new("http://a", 10)).unwrap();
        store.insert_history(&entry(id, "ok", 1)).unwrap();
        store.delete_url(id).unwrap();
        assert_eq!(store.get_history(id).unwrap().len(), 1);
    }

    #[test]
    fn test_for_each_history_streams_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_history(&entry(1, "a", 1)).unwrap();
        store.insert_history(&entry(1, "b", 2)).unwrap();

        let mut seen = Vec::new();
        let visited = store
            .for_each_history(1, |record| {
                seen.push(record.response);
                Ok(())
            })
            .unwrap();
        assert_eq!(visited, 2);
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_schema_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");

        let store = SqliteStore::open(&path).unwrap();
        store.upsert_url(&NewUrl::new("http://a", 10)).unwrap();
        store.initialize_schema().unwrap();
        drop(store);

        let (reopened, status) = SqliteStore::connect(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert_eq!(status, SchemaStatus::Ready);
        assert_eq!(reopened.count_urls().unwrap(), 1);
    }

    #[test]
    fn test_existing_database_with_duplicates_is_degraded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE urls_tab (id INTEGER PRIMARY KEY, url TEXT NOT NULL, interval INTEGER NOT NULL);
                 INSERT INTO urls_tab (url, interval) VALUES ('http://dup', 1), ('http://dup', 2);",
            )
            .unwrap();
        }

        let (store, status) = SqliteStore::connect(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert!(matches!(status, SchemaStatus::Degraded(_)));
        assert_eq!(store.list_urls().unwrap().len(), 2);

        assert!(matches!(SqliteStore::open(&path), Err(Error::Schema(_))));
    }

    const LEGACY_URLS_DDL: &str = "CREATE TABLE IF NOT EXISTS urls_tab (
        id INTEGER PRIMARY KEY,
        url TEXT NOT NULL,
        interval INTEGER NOT NULL);";

    #[test]
    fn test_legacy_table_does_not_reuse_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        Connection::open(&path).unwrap().execute_batch(LEGACY_URLS_DDL).unwrap();

        let (store, status) = SqliteStore::connect(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert_eq!(status, SchemaStatus::Ready);

        let a = store.upsert_url(&NewUrl::new("http://a", 10)).unwrap();
        store.delete_url(a).unwrap();
        let b = store.upsert_url(&NewUrl::new("http://b", 10)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_legacy_rows_keep_ids_after_migration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(LEGACY_URLS_DDL).unwrap();
            conn.execute_batch(
                "INSERT INTO urls_tab (url, interval) VALUES ('http://x', 30), ('http://y', 60);",
            )
            .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.find_url("http://y").unwrap().unwrap().id, 2);
        assert!(store.delete_url(2).unwrap());
        assert_eq!(store.upsert_url(&NewUrl::new("http://z", 5)).unwrap(), 3);
        assert_eq!(store.upsert_url(&NewUrl::new("http://x", 45)).unwrap(), 1);

        // A second start finds the migrated table and leaves it alone.
        drop(store);
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.count_urls().unwrap(), 2);
        assert!(reopened.upsert_url(&NewUrl::new("http://w", 5)).unwrap() > 3);
    }

    #[test]
    fn test_failed_schema_on_fresh_file_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.db");
        // A directory where the rollback journal must go makes every write fail.
        std::fs::create_dir(dir.path().join("fresh.db-journal")).unwrap();

        let result = SqliteStore::connect(&path, DEFAULT_BUSY_TIMEOUT);
        assert!(matches!(result, Err(Error::Schema(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.upsert_url(&NewUrl::new("http://a", 10)).unwrap();
        store.insert_history(&entry(id, "ok", 1)).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.urls, 1);
        assert_eq!(stats.history, 1);
    }
}

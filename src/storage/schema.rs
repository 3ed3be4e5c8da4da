//! Database schema definitions

/// SQL to create the monitored URLs table.
/// AUTOINCREMENT keeps ids from being handed out again after a delete.
pub const CREATE_URLS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS urls_tab (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    interval INTEGER NOT NULL
)
"#;

/// SQL to create the fetch history table.
/// `id` refers to `urls_tab.id` without a foreign key constraint.
pub const CREATE_URLS_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS urls_history_tab (
    id INTEGER NOT NULL,
    response TEXT NOT NULL,
    duration REAL NOT NULL,
    created_at TEXT NOT NULL
)
"#;

/// SQL to create indexes.
/// The unique index on `url` is the conflict target of the upsert; it is an
/// index rather than a column constraint so that it also lands on files
/// created before it existed.
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_urls_url ON urls_tab(url)",
    "CREATE INDEX IF NOT EXISTS idx_history_id ON urls_history_tab(id, created_at)",
];

/// Table creation statements, run before any migration
pub const CREATE_TABLES: &[&str] = &[CREATE_URLS_TABLE, CREATE_URLS_HISTORY_TABLE];

/// Rebuilds a `urls_tab` created without AUTOINCREMENT (plain
/// `INTEGER PRIMARY KEY` reuses the highest id once it is deleted).
/// Ids are kept and the sequence is seeded with the largest one.
pub const MIGRATE_URLS_TO_AUTOINCREMENT: &str = r#"
CREATE TABLE urls_tab_migrated (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    interval INTEGER NOT NULL
);
INSERT INTO urls_tab_migrated (id, url, interval) SELECT id, url, interval FROM urls_tab;
DROP TABLE urls_tab;
ALTER TABLE urls_tab_migrated RENAME TO urls_tab;
DELETE FROM sqlite_sequence WHERE name = 'urls_tab';
INSERT INTO sqlite_sequence (name, seq) SELECT 'urls_tab', COALESCE(MAX(id), 0) FROM urls_tab;
"#;

/// Whether the stored DDL of `urls_tab` already allocates ids with AUTOINCREMENT
pub fn has_autoincrement(create_sql: &str) -> bool {
    create_sql.to_ascii_uppercase().contains("AUTOINCREMENT")
}

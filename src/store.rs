//! SQLite connection setup shared by the analysis cache and the pending ledger

use std::path::Path;

use rusqlite::Connection;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("No entry for {0}")]
    NotFound(String),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

/// Schema migrations
/// Each version contains a list of SQL statements to execute
const MIGRATIONS: &[&[&str]] = &[
    // v1: analysis cache and pending update ledger
    &[
        r#"
        CREATE TABLE IF NOT EXISTS analysis_cache (
            package TEXT PRIMARY KEY NOT NULL,
            url TEXT NOT NULL,
            schema_json TEXT NOT NULL,
            cached_at INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS pending_updates (
            package TEXT PRIMARY KEY NOT NULL,
            current_version TEXT NOT NULL,
            new_version TEXT NOT NULL,
            status TEXT NOT NULL,
            source_url TEXT,
            detail TEXT,
            updated_at INTEGER NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_pending_status ON pending_updates(status)",
    ],
];

/// Opens (creating if needed) the database file and brings the schema up to date.
pub fn open(db_path: &Path) -> Result<Connection, StoreError> {
    info!("Opening database at {:?}", db_path);

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;

    // Enable WAL mode for better concurrency
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    migrate(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    migrate(&conn)?;
    Ok(conn)
}

/// Apply pending migrations based on user_version pragma
fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let current_version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    for (i, statements) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version <= current_version {
            continue;
        }
        for sql in *statements {
            conn.execute(sql, [])?;
        }
        debug!("Applied migration v{}", version);
    }

    let target_version = MIGRATIONS.len() as i32;
    if target_version > current_version {
        conn.pragma_update(None, "user_version", target_version)?;
        debug!("Updated schema version to v{}", target_version);
    }

    Ok(())
}

/// Current timestamp in milliseconds since UNIX epoch
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

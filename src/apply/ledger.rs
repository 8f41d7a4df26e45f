//! Pending update ledger

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use tracing::{debug, info};

use crate::store::{self, StoreError, now_ms};

/// Lifecycle of a proposed bump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    Pending,
    Validated,
    Failed,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::Pending => "pending",
            PendingStatus::Validated => "validated",
            PendingStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PendingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PendingStatus::Pending),
            "validated" => Ok(PendingStatus::Validated),
            "failed" => Ok(PendingStatus::Failed),
            other => Err(format!("unknown pending status: {other}")),
        }
    }
}

/// One proposed version bump
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingUpdate {
    pub package: String,
    pub current_version: String,
    pub new_version: String,
    pub status: PendingStatus,
    /// Message recorded with the last status change
    pub detail: Option<String>,
    pub source_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PendingUpdate {
    pub fn new(
        package: impl Into<String>,
        current_version: impl Into<String>,
        new_version: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            current_version: current_version.into(),
            new_version: new_version.into(),
            status: PendingStatus::Pending,
            detail: None,
            source_url: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

/// Persisted record of proposed bumps, mutated by the applier
#[cfg_attr(test, automock)]
pub trait PendingStore: Send + Sync {
    /// Records `update`, replacing any entry for the same package and resetting it to pending
    fn add(&self, update: PendingUpdate) -> Result<(), StoreError>;

    fn get(&self, package: &str) -> Result<Option<PendingUpdate>, StoreError>;

    /// Fails with [`StoreError::NotFound`] when the package has no entry
    fn set_status(
        &self,
        package: &str,
        status: PendingStatus,
        detail: &str,
    ) -> Result<(), StoreError>;

    /// All entries, optionally restricted to one status, ordered by package
    fn list(&self, status: Option<PendingStatus>) -> Result<Vec<PendingUpdate>, StoreError>;
}

pub struct SqlitePendingStore {
    conn: Mutex<Connection>,
}

impl SqlitePendingStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(store::open(db_path)?))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(store::open_in_memory()?))
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<PendingUpdate> {
        let status: String = row.get(3)?;
        let updated_at: i64 = row.get(6)?;
        Ok(PendingUpdate {
            package: row.get(0)?,
            current_version: row.get(1)?,
            new_version: row.get(2)?,
            status: status.parse().map_err(|e: String| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    e.into(),
                )
            })?,
            detail: row.get(4)?,
            source_url: row.get(5)?,
            updated_at: DateTime::from_timestamp_millis(updated_at).unwrap_or_default(),
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT package, current_version, new_version, status, detail, \
     source_url, updated_at FROM pending_updates";

impl PendingStore for SqlitePendingStore {
    fn add(&self, update: PendingUpdate) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO pending_updates \
             (package, current_version, new_version, status, detail, source_url, updated_at) \
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6)",
            params![
                update.package,
                update.current_version,
                update.new_version,
                PendingStatus::Pending.as_str(),
                update.source_url,
                now_ms()
            ],
        )?;
        info!(
            "Recorded pending update {} {} -> {}",
            update.package, update.current_version, update.new_version
        );
        Ok(())
    }

    fn get(&self, package: &str) -> Result<Option<PendingUpdate>, StoreError> {
        let conn = self.lock_conn()?;
        let update = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE package = ?1"),
                params![package],
                Self::from_row,
            )
            .optional()?;
        Ok(update)
    }

    fn set_status(
        &self,
        package: &str,
        status: PendingStatus,
        detail: &str,
    ) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE pending_updates SET status = ?2, detail = ?3, updated_at = ?4 \
             WHERE package = ?1",
            params![package, status.as_str(), detail, now_ms()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(package.to_string()));
        }
        debug!("Set {} status to {}: {}", package, status, detail);
        Ok(())
    }

    fn list(&self, status: Option<PendingStatus>) -> Result<Vec<PendingUpdate>, StoreError> {
        let conn = self.lock_conn()?;
        let updates = match status {
            Some(status) => conn
                .prepare(&format!("{SELECT_COLUMNS} WHERE status = ?1 ORDER BY package"))?
                .query_map(params![status.as_str()], Self::from_row)?
                .collect::<Result<Vec<_>, _>>()?,
            None => conn
                .prepare(&format!("{SELECT_COLUMNS} ORDER BY package"))?
                .query_map([], Self::from_row)?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(updates)
    }
}

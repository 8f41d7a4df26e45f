//! TTL-bound store of validated extraction schemas, keyed by package

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::config::ANALYSIS_CACHE_TTL;
use crate::extract::ExtractionSchema;
use crate::store::{self, StoreError};

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A validated schema together with the endpoint it was validated against
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisCacheEntry {
    pub schema: ExtractionSchema,
    pub url: String,
    pub cached_at: DateTime<Utc>,
}

pub struct AnalysisCache {
    conn: Mutex<Connection>,
    ttl: Duration,
    now: Clock,
}

impl AnalysisCache {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            ttl: ANALYSIS_CACHE_TTL,
            now: Arc::new(Utc::now),
        }
    }

    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(store::open(db_path)?))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(store::open_in_memory()?))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, now: Clock) -> Self {
        self.now = now;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    /// Whether `entry` is younger than the TTL. An entry exactly TTL old is stale.
    pub fn is_fresh(&self, entry: &AnalysisCacheEntry) -> bool {
        let age_ms = (self.now)().timestamp_millis() - entry.cached_at.timestamp_millis();
        age_ms < self.ttl_ms()
    }

    /// Cached entry for `package` if it is still fresh
    pub fn get(&self, package: &str) -> Result<Option<AnalysisCacheEntry>, StoreError> {
        let entry = self.get_entry(package)?.filter(|entry| self.is_fresh(entry));
        debug!(
            "Analysis cache {} for {}",
            if entry.is_some() { "hit" } else { "miss" },
            package
        );
        Ok(entry)
    }

    /// Like [`get`](Self::get), but `bypass` forces a miss without touching the stored entry
    pub fn get_with_bypass(
        &self,
        package: &str,
        bypass: bool,
    ) -> Result<Option<AnalysisCacheEntry>, StoreError> {
        if bypass {
            debug!("Analysis cache bypassed for {}", package);
            return Ok(None);
        }
        self.get(package)
    }

    /// Stored entry regardless of age
    pub fn get_entry(&self, package: &str) -> Result<Option<AnalysisCacheEntry>, StoreError> {
        let conn = self.lock_conn()?;
        let row: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT url, schema_json, cached_at FROM analysis_cache WHERE package = ?1",
                params![package],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(url, schema_json, cached_at)| -> Result<_, StoreError> {
            Ok(AnalysisCacheEntry {
                schema: serde_json::from_str(&schema_json)?,
                url,
                cached_at: DateTime::from_timestamp_millis(cached_at).unwrap_or_default(),
            })
        })
        .transpose()
    }

    /// Stores `schema` for `package`, stamped with the current time
    pub fn set(&self, package: &str, schema: &ExtractionSchema, url: &str) -> Result<(), StoreError> {
        self.set_entry(
            package,
            &AnalysisCacheEntry {
                schema: schema.clone(),
                url: url.to_string(),
                cached_at: (self.now)(),
            },
        )
    }

    /// Stores `entry` with its own timestamp, replacing any previous entry
    pub fn set_entry(&self, package: &str, entry: &AnalysisCacheEntry) -> Result<(), StoreError> {
        let schema_json = serde_json::to_string(&entry.schema)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO analysis_cache (package, url, schema_json, cached_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                package,
                entry.url,
                schema_json,
                entry.cached_at.timestamp_millis()
            ],
        )?;
        info!("Cached analysis for {} ({})", package, entry.url);
        Ok(())
    }

    /// Removes the entry for `package`, returning whether one existed
    pub fn remove(&self, package: &str) -> Result<bool, StoreError> {
        let conn = self.lock_conn()?;
        let removed = conn.execute(
            "DELETE FROM analysis_cache WHERE package = ?1",
            params![package],
        )?;
        Ok(removed > 0)
    }

    /// Deletes all stale entries, returning how many were removed
    pub fn prune_expired(&self) -> Result<usize, StoreError> {
        let cutoff = (self.now)().timestamp_millis().saturating_sub(self.ttl_ms());
        let conn = self.lock_conn()?;
        let removed = conn.execute(
            "DELETE FROM analysis_cache WHERE cached_at <= ?1",
            params![cutoff],
        )?;
        if removed > 0 {
            info!("Pruned {} expired analysis cache entries", removed);
        }
        Ok(removed)
    }
}

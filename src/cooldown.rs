//! Per-model failure cooldowns persisted to SQLite.
//!
//! One row per model that failed recently. Rows are overwritten by later
//! failures and deleted by the next success; an expired row is simply
//! ignored when read and never swept.

use crate::error::GatewayError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How long a failed model stays out of rotation.
pub const COOLDOWN_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Cooldown records shared by every request handler.
#[derive(Clone)]
pub struct CooldownStore {
    conn: Arc<Mutex<Connection>>,
    window_secs: i64,
}

impl CooldownStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GatewayError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| GatewayError::StoreUnavailable(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory store for testing.
    pub fn in_memory() -> Result<Self, GatewayError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            window_secs: COOLDOWN_WINDOW.as_secs() as i64,
        }
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS failures (
                model TEXT PRIMARY KEY,
                failed_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, GatewayError> {
        self.conn
            .lock()
            .map_err(|_| GatewayError::StoreUnavailable("connection lock poisoned".to_string()))
    }

    /// Record a failure for `model` at the current time.
    pub fn mark_failure(&self, model: &str) -> Result<(), GatewayError> {
        self.mark_failure_at(model, Utc::now().timestamp())
    }

    pub(crate) fn mark_failure_at(&self, model: &str, failed_at: i64) -> Result<(), GatewayError> {
        self.lock()?.execute(
            "INSERT INTO failures (model, failed_at) VALUES (?1, ?2)
             ON CONFLICT(model) DO UPDATE SET failed_at = excluded.failed_at",
            params![model, failed_at],
        )?;
        Ok(())
    }

    /// Whether `model` failed within the cooldown window.
    pub fn should_skip(&self, model: &str) -> Result<bool, GatewayError> {
        self.should_skip_at(model, Utc::now().timestamp())
    }

    fn should_skip_at(&self, model: &str, now: i64) -> Result<bool, GatewayError> {
        let failed_at: Option<i64> = self
            .lock()?
            .query_row(
                "SELECT failed_at FROM failures WHERE model = ?1",
                params![model],
                |row| row.get(0),
            )
            .optional()?;

        Ok(matches!(failed_at, Some(ts) if now - ts < self.window_secs))
    }

    /// Forget any failure recorded for `model`.
    pub fn clear_failure(&self, model: &str) -> Result<(), GatewayError> {
        self.lock()?
            .execute("DELETE FROM failures WHERE model = ?1", params![model])?;
        Ok(())
    }

    /// Drop every record. Returns how many were removed.
    pub fn reset_all(&self) -> Result<usize, GatewayError> {
        Ok(self.lock()?.execute("DELETE FROM failures", [])?)
    }

    #[cfg(test)]
    pub(crate) fn record_count(&self) -> usize {
        self.lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM failures", [], |row| row.get::<_, i64>(0))
            .unwrap() as usize
    }
}

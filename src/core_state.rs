//! Shared application state: configuration, the database location and the
//! buffered request-access log.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::AppConfig;
use crate::db::{self, AccessInsert};

/// Maximum access-log buffer size before flush.
const ACCESS_BUFFER_CAPACITY: usize = 100;

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

/// Wrapped in `Arc` at startup and shared by every request handler.
pub struct CoreState {
    pub config: AppConfig,
    db_path: PathBuf,
    access: AccessLogger,
}

impl CoreState {
    /// Build the state and make sure the schema is current.
    pub fn new(config: AppConfig) -> Result<Self, CoreError> {
        let db_path = config.database_path.clone();
        db::open_database(&db_path)?;
        tracing::info!(path = %db_path.display(), "Database ready");
        Ok(Self {
            config,
            db_path,
            access: AccessLogger::new(),
        })
    }

    /// Open a fresh connection. Each request gets its own.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ── Access logging ──────────────────────────────────────

    /// Buffer an access event. Auto-flushes to DB when the buffer is full.
    pub fn log_access(&self, entry: AccessInsert) {
        if self.access.log(entry) {
            if let Err(e) = self.flush_access_log() {
                tracing::warn!("Auto-flush access log failed: {e}");
            }
        }
    }

    pub fn flush_access_log(&self) -> Result<usize, CoreError> {
        if self.access.buffer_len() == 0 {
            return Ok(0);
        }
        let conn = self.open_db()?;
        self.access.flush_to_db(&conn)
    }

    pub fn pending_access_entries(&self) -> usize {
        self.access.buffer_len()
    }
}

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
}

// ═══════════════════════════════════════════════════════════
// Access logger
// ═══════════════════════════════════════════════════════════

/// In-memory access-log buffer. Entries are flushed to SQLite
/// when the buffer reaches capacity, on explicit flush and at shutdown.
pub struct AccessLogger {
    buffer: Mutex<Vec<AccessInsert>>,
}

impl AccessLogger {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(ACCESS_BUFFER_CAPACITY)),
        }
    }

    /// Returns `true` if the buffer has reached flush threshold.
    pub fn log(&self, entry: AccessInsert) -> bool {
        match self.buffer.lock() {
            Ok(mut buf) => {
                buf.push(entry);
                buf.len() >= ACCESS_BUFFER_CAPACITY
            }
            Err(_) => {
                tracing::error!("Access log buffer lock poisoned; entry dropped");
                false
            }
        }
    }

    pub fn drain(&self) -> Result<Vec<AccessInsert>, CoreError> {
        let mut buf = self.buffer.lock().map_err(|_| CoreError::LockPoisoned)?;
        Ok(buf.drain(..).collect())
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    /// Write buffered entries. On failure the entries
    /// go back into the buffer for the next attempt.
    pub fn flush_to_db(&self, conn: &rusqlite::Connection) -> Result<usize, CoreError> {
        let entries = self.drain()?;
        if entries.is_empty() {
            return Ok(0);
        }
        if let Err(e) = db::insert_access_entries(conn, &entries) {
            let mut buf = self.buffer.lock().map_err(|_| CoreError::LockPoisoned)?;
            let newer = std::mem::replace(&mut *buf, entries);
            buf.extend(newer);
            return Err(e.into());
        }
        tracing::debug!(count = entries.len(), "Flushed access entries to database");
        Ok(entries.len())
    }
}

impl Default for AccessLogger {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

//! Upload queue storage and persistence.
//!
//! Provides SQLite-backed storage for queue entries and the connectivity event
//! log. Every state transition is a single statement or an immediate
//! transaction, so concurrent workers (and other processes sharing the file)
//! never observe the same entry as claimed twice.

use super::error::QueueError;
use super::models::*;
use super::schema::UPLOAD_QUEUE_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::{check_integrity, validate_and_migrate};
use anyhow::{bail, Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

const ACTIVE_STATUSES_SQL: &str = "('pending', 'in_progress')";

/// Trait for upload queue storage operations.
pub trait UploadQueueStore: Send + Sync {
    // === Queue Management ===

    /// Insert a new pending entry unless an identical artifact is still active
    /// or the number of active entries reached `max_queue_size`.
    fn insert(&self, entry: NewQueueEntry, max_queue_size: usize) -> Result<InsertOutcome>;

    /// Get an entry by id.
    fn get_entry(&self, id: EntryId) -> Result<Option<QueueEntry>>;

    /// List entries with the given status, in claim order.
    fn list_by_status(&self, status: EntryStatus) -> Result<Vec<QueueEntry>>;

    // === State Transitions (atomic) ===

    /// Atomically claim the highest-priority pending entry whose
    /// `next_eligible_at` is not after `now` (PENDING → IN_PROGRESS).
    fn claim_next_eligible(&self, now: i64) -> Result<Option<QueueEntry>>;

    /// Mark a claimed entry as completed.
    fn record_success(&self, id: EntryId, now: i64) -> Result<()>;

    /// Record a failed transfer on a claimed entry. Consumes one retry; the
    /// entry goes back to pending at `next_eligible_at`, or to failed once
    /// its retry budget is exhausted. Returns the resulting status.
    fn record_transport_failure(
        &self,
        id: EntryId,
        error_message: &str,
        next_eligible_at: i64,
        now: i64,
    ) -> Result<EntryStatus>;

    /// Mark a claimed entry as failed without consuming retry budget.
    fn record_terminal_failure(
        &self,
        id: EntryId,
        kind: FailureKind,
        error_message: &str,
        now: i64,
    ) -> Result<()>;

    /// Return in-progress entries whose last attempt started before
    /// `older_than` to pending. Returns the number of entries reset.
    fn reset_stale_in_progress(&self, older_than: i64) -> Result<usize>;

    // === Statistics ===

    /// Count entries by status.
    fn queue_stats(&self) -> Result<QueueStats>;

    /// Count entries completed at or after `since`.
    fn count_completed_since(&self, since: i64) -> Result<usize>;

    // === Cleanup ===

    /// Delete entries in one of `statuses` whose completion time (creation
    /// time if never completed) is before `older_than`.
    fn purge(&self, older_than: i64, statuses: &[EntryStatus]) -> Result<usize>;

    // === Connectivity Log ===

    /// Append a connectivity transition.
    fn append_connectivity_event(&self, event: &ConnectivityEvent) -> Result<()>;

    /// Most recent connectivity events, newest first.
    fn recent_connectivity_events(&self, limit: usize) -> Result<Vec<ConnectivityEvent>>;

    /// Delete connectivity events recorded before `older_than`.
    fn prune_connectivity_events(&self, older_than: i64) -> Result<usize>;
}

/// SQLite-backed upload queue store.
pub struct SqliteUploadQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUploadQueueStore {
    /// Open an existing queue database or create a new one with the latest
    /// schema.
    ///
    /// An existing database that fails the integrity check or does not match
    /// a known schema version yields [`QueueError::StoreCorruption`].
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, QueueError> {
        let db_path = db_path.as_ref();

        let conn = if db_path.exists() {
            let conn = Connection::open(db_path)
                .with_context(|| format!("Failed to open upload queue database {:?}", db_path))?;
            Self::configure(&conn)
                .and_then(|_| check_integrity(&conn))
                .and_then(|_| validate_and_migrate(&conn, UPLOAD_QUEUE_VERSIONED_SCHEMAS, "upload queue"))
                .map_err(|e| {
                    QueueError::StoreCorruption(format!("{:?}: {:#}", db_path, e))
                })?;
            conn
        } else {
            let conn = Connection::open(db_path)
                .with_context(|| format!("Failed to create upload queue database {:?}", db_path))?;
            Self::configure(&conn)?;
            UPLOAD_QUEUE_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new upload queue database at {:?}", db_path);
            conn
        };

        Ok(SqliteUploadQueueStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        UPLOAD_QUEUE_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;

        Ok(SqliteUploadQueueStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// WAL journal with full sync: a claim or outcome that returned is on disk
    /// and survives a hard kill.
    fn configure(conn: &Connection) -> Result<()> {
        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            warn!("Upload queue database is using journal mode {}", journal_mode);
        }
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<QueueEntry> {
        let status: String = row.get("status")?;
        Ok(QueueEntry {
            id: EntryId(row.get("id")?),
            artifact_path: PathBuf::from(row.get::<_, String>("artifact_path")?),
            camera_id: row.get("camera_id")?,
            session_id: row.get("session_id")?,
            arena: row.get("arena")?,
            quadra: row.get("quadra")?,
            file_size: row.get::<_, i64>("file_size")? as u64,
            checksum: row.get("checksum")?,
            priority: row.get("priority")?,
            status: EntryStatus::from_db_str(&status).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    Type::Text,
                    format!("unknown entry status '{}'", status).into(),
                )
            })?,
            retry_count: row.get::<_, i64>("retry_count")? as u32,
            max_retries: row.get::<_, i64>("max_retries")? as u32,
            last_attempt_at: row.get("last_attempt_at")?,
            next_eligible_at: row.get("next_eligible_at")?,
            created_at: row.get("created_at")?,
            completed_at: row.get("completed_at")?,
            error_kind: row
                .get::<_, Option<String>>("error_kind")?
                .and_then(|s| FailureKind::from_str(&s)),
            error_message: row.get("error_message")?,
            destination: row.get("destination")?,
        })
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<ConnectivityEvent> {
        let status: String = row.get("status")?;
        Ok(ConnectivityEvent {
            timestamp: row.get("timestamp")?,
            status: MonitorState::from_db_str(&status).unwrap_or(MonitorState::Unknown),
            latency_ms: row.get::<_, Option<i64>>("latency_ms")?.map(|v| v as u64),
            error: row.get("error")?,
        })
    }
}

fn path_to_db(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Artifact path is not valid UTF-8: {:?}", path))
}

impl UploadQueueStore for SqliteUploadQueueStore {
    // === Queue Management ===

    fn insert(&self, entry: NewQueueEntry, max_queue_size: usize) -> Result<InsertOutcome> {
        let artifact_path = path_to_db(&entry.artifact_path)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row(
                &format!(
                    "SELECT id FROM queue_entries
                     WHERE artifact_path = ?1 AND checksum = ?2 AND status IN {}
                     ORDER BY id LIMIT 1",
                    ACTIVE_STATUSES_SQL
                ),
                params![artifact_path, entry.checksum],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(InsertOutcome::Duplicate(EntryId(id)));
        }

        let active: i64 = tx.query_row(
            &format!(
                "SELECT COUNT(*) FROM queue_entries WHERE status IN {}",
                ACTIVE_STATUSES_SQL
            ),
            [],
            |row| row.get(0),
        )?;
        if active as usize >= max_queue_size {
            return Ok(InsertOutcome::QueueFull {
                size: active as usize,
            });
        }

        tx.execute(
            r#"INSERT INTO queue_entries (
                artifact_path, camera_id, session_id, arena, quadra, file_size,
                checksum, priority, status, retry_count, max_retries, created_at,
                destination
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', 0, ?9, ?10, ?11)"#,
            params![
                artifact_path,
                entry.camera_id,
                entry.session_id,
                entry.arena,
                entry.quadra,
                entry.file_size as i64,
                entry.checksum,
                entry.priority,
                entry.max_retries as i64,
                entry.created_at,
                entry.destination,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(InsertOutcome::Inserted(EntryId(id)))
    }

    fn get_entry(&self, id: EntryId) -> Result<Option<QueueEntry>> {
        let conn = self.conn.lock().unwrap();
        let entry = conn
            .query_row(
                "SELECT * FROM queue_entries WHERE id = ?1",
                [id.0],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn list_by_status(&self, status: EntryStatus) -> Result<Vec<QueueEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM queue_entries
               WHERE status = ?1
               ORDER BY priority DESC, created_at ASC, id ASC"#,
        )?;
        let entries = stmt
            .query_map([status.as_db_str()], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    // === State Transitions (atomic) ===

    fn claim_next_eligible(&self, now: i64) -> Result<Option<QueueEntry>> {
        let conn = self.conn.lock().unwrap();
        let entry = conn
            .query_row(
                r#"UPDATE queue_entries
                   SET status = 'in_progress', last_attempt_at = ?1
                   WHERE id = (
                       SELECT id FROM queue_entries
                       WHERE status = 'pending'
                         AND (next_eligible_at IS NULL OR next_eligible_at <= ?1)
                       ORDER BY priority DESC, created_at ASC, id ASC
                       LIMIT 1
                   )
                   AND status = 'pending'
                   RETURNING *"#,
                [now],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn record_success(&self, id: EntryId, now: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE queue_entries
               SET status = 'completed', completed_at = ?2, next_eligible_at = NULL,
                   error_kind = NULL, error_message = NULL
               WHERE id = ?1 AND status = 'in_progress'"#,
            params![id.0, now],
        )?;
        if updated == 0 {
            bail!("Entry {} is not in progress", id);
        }
        Ok(())
    }

    fn record_transport_failure(
        &self,
        id: EntryId,
        error_message: &str,
        next_eligible_at: i64,
        now: i64,
    ) -> Result<EntryStatus> {
        let conn = self.conn.lock().unwrap();
        // Right-hand sides see the pre-update row.
        let status: Option<String> = conn
            .query_row(
                r#"UPDATE queue_entries
                   SET retry_count = retry_count + 1,
                       error_kind = 'transport',
                       error_message = ?2,
                       status = CASE WHEN retry_count + 1 >= max_retries
                                     THEN 'failed' ELSE 'pending' END,
                       next_eligible_at = CASE WHEN retry_count + 1 >= max_retries
                                               THEN NULL ELSE ?3 END,
                       completed_at = CASE WHEN retry_count + 1 >= max_retries
                                           THEN ?4 ELSE NULL END
                   WHERE id = ?1 AND status = 'in_progress'
                   RETURNING status"#,
                params![id.0, error_message, next_eligible_at, now],
                |row| row.get(0),
            )
            .optional()?;

        match status {
            Some(status) => EntryStatus::from_db_str(&status)
                .with_context(|| format!("Unknown entry status '{}'", status)),
            None => bail!("Entry {} is not in progress", id),
        }
    }

    fn record_terminal_failure(
        &self,
        id: EntryId,
        kind: FailureKind,
        error_message: &str,
        now: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE queue_entries
               SET status = 'failed', error_kind = ?2, error_message = ?3,
                   completed_at = ?4, next_eligible_at = NULL
               WHERE id = ?1 AND status = 'in_progress'"#,
            params![id.0, kind.as_str(), error_message, now],
        )?;
        if updated == 0 {
            bail!("Entry {} is not in progress", id);
        }
        Ok(())
    }

    fn reset_stale_in_progress(&self, older_than: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let reset = conn.execute(
            r#"UPDATE queue_entries
               SET status = 'pending', next_eligible_at = NULL
               WHERE status = 'in_progress'
                 AND (last_attempt_at IS NULL OR last_attempt_at < ?1)"#,
            [older_than],
        )?;
        Ok(reset)
    }

    // === Statistics ===

    fn queue_stats(&self) -> Result<QueueStats> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM queue_entries GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut stats = QueueStats::default();
        for row in rows {
            let (status, count) = row?;
            let count = count as usize;
            match EntryStatus::from_db_str(&status) {
                Some(EntryStatus::Pending) => stats.pending = count,
                Some(EntryStatus::InProgress) => stats.in_progress = count,
                Some(EntryStatus::Completed) => stats.completed = count,
                Some(EntryStatus::Failed) => stats.failed = count,
                None => warn!("Ignoring {} entries with unknown status '{}'", count, status),
            }
        }
        Ok(stats)
    }

    fn count_completed_since(&self, since: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM queue_entries WHERE status = 'completed' AND completed_at >= ?1",
            [since],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // === Cleanup ===

    fn purge(&self, older_than: i64, statuses: &[EntryStatus]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for status in statuses {
            deleted += tx.execute(
                r#"DELETE FROM queue_entries
                   WHERE status = ?1 AND COALESCE(completed_at, created_at) < ?2"#,
                params![status.as_db_str(), older_than],
            )?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    // === Connectivity Log ===

    fn append_connectivity_event(&self, event: &ConnectivityEvent) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO connectivity_events (timestamp, status, latency_ms, error) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.timestamp,
                event.status.as_db_str(),
                event.latency_ms.map(|v| v as i64),
                event.error,
            ],
        )?;
        Ok(())
    }

    fn recent_connectivity_events(&self, limit: usize) -> Result<Vec<ConnectivityEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM connectivity_events ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let events = stmt
            .query_map([limit as i64], Self::row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    fn prune_connectivity_events(&self, older_than: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM connectivity_events WHERE timestamp < ?1",
            [older_than],
        )?;
        Ok(deleted)
    }
}

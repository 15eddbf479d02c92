//! Data models for the upload queue.
//!
//! Defines queue entries, their lifecycle status, failure kinds, connectivity
//! events and the reports exposed to callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier assigned by the store. Strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub i64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    InProgress,
    Completed, // terminal
    Failed,    // terminal
}

impl EntryStatus {
    pub const ALL: [EntryStatus; 4] = [
        EntryStatus::Pending,
        EntryStatus::InProgress,
        EntryStatus::Completed,
        EntryStatus::Failed,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::InProgress => "in_progress",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EntryStatus::Pending),
            "in_progress" => Some(EntryStatus::InProgress),
            "completed" => Some(EntryStatus::Completed),
            "failed" => Some(EntryStatus::Failed),
            _ => None,
        }
    }
}

/// Why an upload attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,         // Network or backend error - retry with backoff
    ArtifactMissing,   // Local file gone - NO retry
    ArtifactCorrupted, // Size or checksum changed since enqueue - NO retry
}

impl FailureKind {
    /// Returns true if this failure should consume retry budget and be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Transport)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::ArtifactMissing => "artifact_missing",
            FailureKind::ArtifactCorrupted => "artifact_corrupted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "transport" => Some(FailureKind::Transport),
            "artifact_missing" => Some(FailureKind::ArtifactMissing),
            "artifact_corrupted" => Some(FailureKind::ArtifactCorrupted),
            _ => None,
        }
    }
}

/// One artifact awaiting or having completed upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub artifact_path: PathBuf,
    pub camera_id: String,
    pub session_id: Option<String>,
    pub arena: Option<String>,
    pub quadra: Option<String>,
    pub file_size: u64,
    /// Content hash taken at enqueue time, `sha256:<hex>`.
    pub checksum: String,
    pub priority: i32,
    pub status: EntryStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_attempt_at: Option<i64>,
    pub next_eligible_at: Option<i64>,
    pub created_at: i64,
    /// Set when the entry reaches a terminal status.
    pub completed_at: Option<i64>,
    pub error_kind: Option<FailureKind>,
    pub error_message: Option<String>,
    pub destination: String,
}

/// Row to insert into the queue. The store assigns the id and initial status.
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub artifact_path: PathBuf,
    pub camera_id: String,
    pub session_id: Option<String>,
    pub arena: Option<String>,
    pub quadra: Option<String>,
    pub file_size: u64,
    pub checksum: String,
    pub priority: i32,
    pub max_retries: u32,
    pub destination: String,
    pub created_at: i64,
}

/// Result of inserting into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(EntryId),
    /// A non-terminal entry with the same path and checksum already exists.
    Duplicate(EntryId),
    /// The number of non-terminal entries already reached the limit.
    QueueFull { size: usize },
}

/// Reachability observed by the connectivity monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Unknown,
    Online,
    Offline,
}

impl MonitorState {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            MonitorState::Unknown => "unknown",
            MonitorState::Online => "online",
            MonitorState::Offline => "offline",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(MonitorState::Unknown),
            "online" => Some(MonitorState::Online),
            "offline" => Some(MonitorState::Offline),
            _ => None,
        }
    }
}

/// Append-only record of a connectivity transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityEvent {
    pub timestamp: i64,
    pub status: MonitorState,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Entry counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed
    }
}

/// Upload attempt totals since the process started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStats {
    pub total_processed: u64,
    pub success_count: u64,
    pub fail_count: u64,
}

/// Shared counters behind [`UploadStats`].
#[derive(Debug, Default)]
pub struct UploadCounters {
    total_processed: AtomicU64,
    success_count: AtomicU64,
    fail_count: AtomicU64,
}

impl UploadCounters {
    pub fn record_success(&self) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        self.fail_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UploadStats {
        UploadStats {
            total_processed: self.total_processed.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            fail_count: self.fail_count.load(Ordering::Relaxed),
        }
    }
}

/// Aggregate view returned by `get_queue_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatusReport {
    /// All rows currently in the queue, terminal ones included.
    pub queue_size: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub recent_completed_24h: usize,
    pub monitor_online: bool,
    pub stats: UploadStats,
}

/// Outcome of one forced processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReport {
    pub online: bool,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ProcessReport {
    pub fn offline() -> Self {
        Self::default()
    }
}

/// Rows removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub completed_removed: usize,
    pub failed_removed: usize,
    pub events_removed: usize,
}

/// Caller-supplied description of an artifact to upload.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub artifact_path: PathBuf,
    pub camera_id: String,
    pub destination: String,
    pub session_id: Option<String>,
    pub arena: Option<String>,
    pub quadra: Option<String>,
    pub priority: i32,
}

impl EnqueueRequest {
    pub const DEFAULT_PRIORITY: i32 = 1;

    pub fn new(
        artifact_path: impl Into<PathBuf>,
        camera_id: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            camera_id: camera_id.into(),
            destination: destination.into(),
            session_id: None,
            arena: None,
            quadra: None,
            priority: Self::DEFAULT_PRIORITY,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_location(mut self, arena: Option<String>, quadra: Option<String>) -> Self {
        self.arena = arena;
        self.quadra = quadra;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

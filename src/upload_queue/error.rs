use std::path::PathBuf;
use thiserror::Error;

use super::models::{EntryId, FailureKind};

/// Errors surfaced by the upload queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Capacity exceeded. Never retried internally, the caller decides.
    #[error("Upload queue is full ({max} active entries)")]
    QueueFull { max: usize },

    /// The artifact is already queued and not yet terminal.
    #[error("Artifact already queued as entry {0}")]
    DuplicateArtifact(EntryId),

    #[error("Artifact not found: {0:?}")]
    ArtifactMissing(PathBuf),

    #[error("Artifact corrupted: {path:?}: {reason}")]
    ArtifactCorrupted { path: PathBuf, reason: String },

    #[error("Upload failed: {0}")]
    TransportFailure(String),

    /// The store can no longer guarantee single-claim semantics.
    #[error("Queue store corrupted: {0}")]
    StoreCorruption(String),

    #[error("Upload queue already started")]
    AlreadyStarted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl QueueError {
    /// How this error is recorded on an entry when it ends an upload attempt.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            QueueError::ArtifactMissing(_) => Some(FailureKind::ArtifactMissing),
            QueueError::ArtifactCorrupted { .. } => Some(FailureKind::ArtifactCorrupted),
            QueueError::TransportFailure(_) => Some(FailureKind::Transport),
            _ => None,
        }
    }
}

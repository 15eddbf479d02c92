//! Upload Queue module
//!
//! Durable, offline-resilient queue of recorded video artifacts. Entries are
//! persisted in SQLite, uploaded by a bounded worker pool while the backend
//! is reachable, retried with exponential backoff, and evicted once terminal
//! and expired.

mod artifact;
mod connectivity_monitor;
mod dispatcher;
mod error;
mod manager;
mod models;
mod queue_store;
mod retry_policy;
mod schema;
mod transport;
mod wake;

#[cfg(test)]
mod test_support;

pub use artifact::{inspect as inspect_artifact, ArtifactInfo};
pub use connectivity_monitor::ConnectivityMonitor;
pub use dispatcher::{AttemptOutcome, UploadDispatcher};
pub use error::QueueError;
pub use manager::UploadQueueManager;
pub use models::*;
pub use queue_store::{SqliteUploadQueueStore, UploadQueueStore};
pub use retry_policy::{Eligibility, RetryPolicy};
pub use schema::UPLOAD_QUEUE_VERSIONED_SCHEMAS;
pub use transport::{ConnectivityProbe, ProbeOutcome, Uploader};
pub use wake::WakeSignal;

/// Current time as unix seconds.
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

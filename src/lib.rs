//! Offline Upload Queue Library
//!
//! Durable upload queue for edge recorders: artifacts are persisted locally
//! and uploaded to the storage backend whenever it is reachable.

pub mod backend;
pub mod config;
pub mod sqlite_persistence;
pub mod upload_queue;

// Re-export commonly used types for convenience
pub use backend::{HttpConnectivityProbe, HttpUploader};
pub use config::{AppConfig, UploadQueueSettings};
pub use upload_queue::{EnqueueRequest, QueueError, UploadQueueManager};

//! Collaborators the queue calls out to: a reachability probe and the
//! transfer itself. Both are injected; the queue never talks to the network.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Result of one round-trip reachability check against the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub reachable: bool,
    pub latency: Duration,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn reachable(latency: Duration) -> Self {
        Self {
            reachable: true,
            latency,
            error: None,
        }
    }

    pub fn unreachable(latency: Duration, error: impl Into<String>) -> Self {
        Self {
            reachable: false,
            latency,
            error: Some(error.into()),
        }
    }
}

/// Checks whether the backend can be reached end to end.
///
/// Returning `Err` is treated the same as an unreachable outcome.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> anyhow::Result<ProbeOutcome>;
}

/// Transfers one artifact to its destination.
///
/// Any `Err` is a transport failure and is retried with backoff.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, artifact_path: &Path, destination: &str) -> anyhow::Result<()>;
}

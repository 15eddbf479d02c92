//! Fake backend collaborators.

use async_trait::async_trait;
use offline_upload_queue::upload_queue::{ConnectivityProbe, ProbeOutcome, Uploader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Probe whose answer is flipped by the test.
pub struct FakeProbe {
    online: AtomicBool,
}

impl FakeProbe {
    pub fn online() -> Self {
        Self {
            online: AtomicBool::new(true),
        }
    }

    pub fn offline() -> Self {
        Self {
            online: AtomicBool::new(false),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for FakeProbe {
    async fn probe(&self) -> anyhow::Result<ProbeOutcome> {
        if self.online.load(Ordering::SeqCst) {
            Ok(ProbeOutcome::reachable(Duration::from_millis(5)))
        } else {
            Ok(ProbeOutcome::unreachable(
                Duration::from_millis(1),
                "network is unreachable",
            ))
        }
    }
}

/// Uploader that records every transfer and fails the first `failures`.
pub struct RecordingUploader {
    failures: AtomicUsize,
    delay: Duration,
    uploads: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            delay: Duration::ZERO,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn destinations(&self) -> Vec<String> {
        self.uploads().into_iter().map(|(_, d)| d).collect()
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(&self, artifact_path: &Path, destination: &str) -> anyhow::Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .push((artifact_path.to_path_buf(), destination.to_string()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("connection reset by peer");
        }
        Ok(())
    }
}

//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::transport::{ConnectivityProbe, ProbeOutcome, Uploader};

#[derive(Debug, Clone, Copy)]
pub enum ProbeStep {
    Reachable,
    Unreachable,
    Error,
    Hang,
}

/// Replays a fixed sequence of probe results, then repeats the fallback.
pub struct ScriptedProbe {
    steps: Mutex<VecDeque<ProbeStep>>,
    fallback: ProbeStep,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(steps: Vec<ProbeStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            fallback: ProbeStep::Unreachable,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_fallback(mut self, fallback: ProbeStep) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectivityProbe for ScriptedProbe {
    async fn probe(&self) -> anyhow::Result<ProbeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);
        match step {
            ProbeStep::Reachable => Ok(ProbeOutcome::reachable(Duration::from_millis(12))),
            ProbeStep::Unreachable => Ok(ProbeOutcome::unreachable(
                Duration::from_millis(3),
                "connection refused",
            )),
            ProbeStep::Error => anyhow::bail!("probe exploded"),
            ProbeStep::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ProbeOutcome::reachable(Duration::from_secs(30)))
            }
        }
    }
}

/// Records every call; fails the first `failures` of them.
pub struct ScriptedUploader {
    failures: AtomicUsize,
    delay: Duration,
    calls: Mutex<Vec<(PathBuf, String)>>,
}

impl ScriptedUploader {
    pub fn succeeding() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for ScriptedUploader {
    async fn upload(&self, artifact_path: &Path, destination: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((artifact_path.to_path_buf(), destination.to_string()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let should_fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            anyhow::bail!("backend returned 503");
        }
        Ok(())
    }
}

/// Write an artifact with the given content into `dir`.
pub fn write_artifact(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

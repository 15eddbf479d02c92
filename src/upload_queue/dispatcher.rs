//! Upload worker pool.
//!
//! Workers share nothing but the store: each one claims an entry atomically,
//! verifies the artifact, uploads it and records the outcome. Idle workers
//! sleep until woken by the connectivity monitor, an enqueue, a forced pass or
//! the fallback tick.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::artifact;
use super::error::QueueError;
use super::models::{EntryStatus, MonitorState, ProcessReport, QueueEntry, UploadCounters};
use super::queue_store::UploadQueueStore;
use super::retry_policy::RetryPolicy;
use super::transport::Uploader;
use super::unix_now;
use super::wake::WakeSignal;
use crate::config::UploadQueueSettings;

/// What happened to a claimed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Uploaded,
    /// Transport failure with retry budget left; back to pending.
    Retrying,
    /// Terminal failure.
    Failed,
}

pub struct UploadDispatcher {
    store: Arc<dyn UploadQueueStore>,
    uploader: Arc<dyn Uploader>,
    retry_policy: RetryPolicy,
    connectivity: watch::Receiver<MonitorState>,
    wake: WakeSignal,
    counters: Arc<UploadCounters>,
    delete_after_upload: bool,
    process_interval: Duration,
}

impl UploadDispatcher {
    pub fn new(
        store: Arc<dyn UploadQueueStore>,
        uploader: Arc<dyn Uploader>,
        connectivity: watch::Receiver<MonitorState>,
        wake: WakeSignal,
        counters: Arc<UploadCounters>,
        settings: &UploadQueueSettings,
    ) -> Self {
        Self {
            store,
            uploader,
            retry_policy: RetryPolicy::new(settings),
            connectivity,
            wake,
            counters,
            delete_after_upload: settings.delete_after_upload,
            process_interval: Duration::from_secs(settings.process_interval_secs),
        }
    }

    fn is_online(&self) -> bool {
        *self.connectivity.borrow() == MonitorState::Online
    }

    /// Start `count` workers. They stop at the first loop boundary after
    /// `shutdown`; an upload in flight is allowed to finish and be recorded.
    pub fn spawn_workers(
        self: &Arc<Self>,
        count: usize,
        shutdown: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (0..count)
            .map(|worker_id| {
                let dispatcher = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { dispatcher.run_worker(worker_id, shutdown).await })
            })
            .collect()
    }

    async fn run_worker(&self, worker_id: usize, shutdown: CancellationToken) {
        let mut wake = self.wake.subscribe();
        debug!(worker_id, "Upload worker started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if self.is_online() {
                match self.process_next().await {
                    Ok(Some(_)) => continue,
                    Ok(None) => {}
                    Err(e) => error!(worker_id, "Upload worker failed to process queue: {:#}", e),
                }
            }

            tokio::select! {
                _ = wake.changed() => {}
                _ = tokio::time::sleep(self.process_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        debug!(worker_id, "Upload worker stopped");
    }

    /// Claim and process the next eligible entry, if any.
    pub async fn process_next(&self) -> Result<Option<AttemptOutcome>> {
        match self.store.claim_next_eligible(unix_now())? {
            Some(entry) => Ok(Some(self.process_claimed(entry).await?)),
            None => Ok(None),
        }
    }

    /// Claim up to `limit` eligible entries and process them concurrently.
    pub async fn process_batch(&self, limit: usize) -> Result<ProcessReport> {
        let now = unix_now();
        let mut claimed = Vec::new();
        while claimed.len() < limit {
            match self.store.claim_next_eligible(now)? {
                Some(entry) => claimed.push(entry),
                None => break,
            }
        }

        let mut report = ProcessReport {
            online: true,
            attempted: claimed.len(),
            ..Default::default()
        };
        for outcome in join_all(claimed.into_iter().map(|e| self.process_claimed(e))).await {
            match outcome? {
                AttemptOutcome::Uploaded => report.succeeded += 1,
                AttemptOutcome::Retrying | AttemptOutcome::Failed => report.failed += 1,
            }
        }
        Ok(report)
    }

    async fn attempt(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        artifact::verify(&entry.artifact_path, entry.file_size, &entry.checksum).await?;
        self.uploader
            .upload(&entry.artifact_path, &entry.destination)
            .await
            .map_err(|e| QueueError::TransportFailure(format!("{:#}", e)))
    }

    async fn process_claimed(&self, entry: QueueEntry) -> Result<AttemptOutcome> {
        debug!(
            entry_id = %entry.id,
            camera_id = %entry.camera_id,
            "Uploading {:?} (attempt {})",
            entry.artifact_path,
            entry.retry_count + 1
        );

        let result = self.attempt(&entry).await;
        let now = unix_now();

        let err = match result {
            Ok(()) => {
                self.store.record_success(entry.id, now)?;
                self.counters.record_success();
                info!(
                    entry_id = %entry.id,
                    camera_id = %entry.camera_id,
                    "Uploaded {:?} to {}",
                    entry.artifact_path,
                    entry.destination
                );
                if self.delete_after_upload {
                    if let Err(e) = tokio::fs::remove_file(&entry.artifact_path).await {
                        warn!(
                            entry_id = %entry.id,
                            "Failed to delete uploaded artifact {:?}: {}",
                            entry.artifact_path,
                            e
                        );
                    }
                }
                return Ok(AttemptOutcome::Uploaded);
            }
            Err(err) => err,
        };

        self.counters.record_failure();
        let message = err.to_string();
        match err.failure_kind() {
            Some(kind) if !kind.is_retryable() => {
                self.store
                    .record_terminal_failure(entry.id, kind, &message, now)?;
                error!(
                    entry_id = %entry.id,
                    camera_id = %entry.camera_id,
                    "Upload failed permanently: {}",
                    message
                );
                Ok(AttemptOutcome::Failed)
            }
            _ => {
                let retry_count = entry.retry_count + 1;
                let next_eligible_at = self.retry_policy.next_eligible_at(retry_count, now);
                match self.store.record_transport_failure(
                    entry.id,
                    &message,
                    next_eligible_at,
                    now,
                )? {
                    EntryStatus::Failed => {
                        error!(
                            entry_id = %entry.id,
                            camera_id = %entry.camera_id,
                            "Upload failed after {} attempts: {}",
                            retry_count,
                            message
                        );
                        Ok(AttemptOutcome::Failed)
                    }
                    _ => {
                        warn!(
                            entry_id = %entry.id,
                            camera_id = %entry.camera_id,
                            "Upload attempt {} failed, retrying in {}s: {}",
                            retry_count,
                            next_eligible_at - now,
                            message
                        );
                        Ok(AttemptOutcome::Retrying)
                    }
                }
            }
        }
    }
}

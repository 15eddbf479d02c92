//! Upload queue orchestration.
//!
//! Owns the store, the connectivity monitor, the worker pool and the cleanup
//! loop, and exposes the operations the recorder calls.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::UploadQueueSettings;

use super::artifact;
use super::connectivity_monitor::ConnectivityMonitor;
use super::dispatcher::UploadDispatcher;
use super::error::QueueError;
use super::models::*;
use super::queue_store::{SqliteUploadQueueStore, UploadQueueStore};
use super::transport::{ConnectivityProbe, Uploader};
use super::unix_now;
use super::wake::WakeSignal;

const RECENT_COMPLETED_WINDOW_SECS: i64 = 24 * 3600;

/// Long-lived owner of the upload queue. Started once, shut down once.
pub struct UploadQueueManager {
    settings: UploadQueueSettings,
    store: Arc<dyn UploadQueueStore>,
    monitor: Arc<ConnectivityMonitor>,
    dispatcher: Arc<UploadDispatcher>,
    wake: WakeSignal,
    counters: Arc<UploadCounters>,
    shutdown: CancellationToken,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UploadQueueManager {
    /// Open (or create) the queue database at `db_path`.
    ///
    /// Fails with [`QueueError::StoreCorruption`] when the existing database
    /// cannot be trusted; the queue must not run on top of it.
    pub fn open<P: AsRef<Path>>(
        db_path: P,
        settings: UploadQueueSettings,
        probe: Arc<dyn ConnectivityProbe>,
        uploader: Arc<dyn Uploader>,
    ) -> Result<Self, QueueError> {
        let store = SqliteUploadQueueStore::new(db_path)?;
        Ok(Self::with_store(Arc::new(store), settings, probe, uploader))
    }

    pub fn with_store(
        store: Arc<dyn UploadQueueStore>,
        settings: UploadQueueSettings,
        probe: Arc<dyn ConnectivityProbe>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        let wake = WakeSignal::new();
        let counters = Arc::new(UploadCounters::default());
        let monitor = Arc::new(ConnectivityMonitor::new(
            probe,
            store.clone(),
            wake.clone(),
            Duration::from_secs(settings.connectivity_check_interval_secs),
            Duration::from_secs(settings.probe_timeout_secs),
        ));
        let dispatcher = Arc::new(UploadDispatcher::new(
            store.clone(),
            uploader,
            monitor.subscribe(),
            wake.clone(),
            counters.clone(),
            &settings,
        ));

        Self {
            settings,
            store,
            monitor,
            dispatcher,
            wake,
            counters,
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Recover entries abandoned by a previous run, then start the monitor,
    /// the upload workers, the stale-entry scan and the cleanup loop.
    pub fn start(&self) -> Result<(), QueueError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(QueueError::AlreadyStarted);
        }

        let grace = Duration::from_secs(self.settings.stale_in_progress_grace_secs);
        recover_stale(self.store.as_ref(), grace)?;

        let mut tasks = Vec::new();

        let monitor = self.monitor.clone();
        let token = self.shutdown.clone();
        tasks.push(tokio::spawn(async move { monitor.run(token).await }));

        tasks.extend(
            self.dispatcher
                .spawn_workers(self.settings.upload_batch_size, &self.shutdown),
        );

        let store = self.store.clone();
        let wake = self.wake.clone();
        let interval = Duration::from_secs(self.settings.process_interval_secs);
        let token = self.shutdown.clone();
        tasks.push(tokio::spawn(async move {
            run_recovery_loop(store, wake, grace, interval, token).await
        }));

        let store = self.store.clone();
        let expiration_hours = self.settings.expiration_hours;
        let interval = self.settings.cleanup_interval();
        let token = self.shutdown.clone();
        tasks.push(tokio::spawn(async move {
            run_cleanup_loop(store, expiration_hours, interval, token).await
        }));

        self.tasks.lock().unwrap().extend(tasks);
        info!(
            "Upload queue started with {} worker(s)",
            self.settings.upload_batch_size
        );
        Ok(())
    }

    /// Stop all background tasks.
    ///
    /// In-flight uploads get `shutdown_grace_secs` to finish and record their
    /// outcome. Tasks still running after that are aborted; their entries
    /// stay in progress until a stale scan recovers them.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles = std::mem::take(&mut *self.tasks.lock().unwrap());
        let started = tokio::time::Instant::now();
        let grace = Duration::from_secs(self.settings.shutdown_grace_secs);

        for mut handle in handles {
            let remaining = grace.saturating_sub(started.elapsed());
            match tokio::time::timeout(remaining, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Upload queue task ended abnormally: {}", e),
                Err(_) => {
                    warn!("Upload queue task did not stop within the grace period, aborting");
                    handle.abort();
                }
            }
        }
        info!("Upload queue stopped");
    }

    /// Queue an artifact for upload.
    ///
    /// The file must exist; its size and checksum are recorded so a later
    /// modification is detected before upload. Enqueueing an artifact that
    /// is already pending or in progress returns
    /// [`QueueError::DuplicateArtifact`] with the existing id.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<EntryId, QueueError> {
        let artifact_path = match tokio::fs::canonicalize(&request.artifact_path).await {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(QueueError::ArtifactMissing(request.artifact_path))
            }
            Err(e) => return Err(e.into()),
        };
        let info = artifact::inspect(&artifact_path).await?;

        let entry = NewQueueEntry {
            artifact_path,
            camera_id: request.camera_id,
            session_id: request.session_id,
            arena: request.arena,
            quadra: request.quadra,
            file_size: info.file_size,
            checksum: info.checksum,
            priority: request.priority,
            max_retries: self.settings.max_retry_attempts,
            destination: request.destination,
            created_at: unix_now(),
        };
        let camera_id = entry.camera_id.clone();
        let artifact_path = entry.artifact_path.clone();

        match self.store.insert(entry, self.settings.max_queue_size)? {
            InsertOutcome::Inserted(id) => {
                info!(
                    entry_id = %id,
                    camera_id = %camera_id,
                    "Queued {:?} for upload",
                    artifact_path
                );
                self.wake.notify();
                Ok(id)
            }
            InsertOutcome::Duplicate(id) => {
                debug!(
                    entry_id = %id,
                    camera_id = %camera_id,
                    "Artifact {:?} is already queued",
                    artifact_path
                );
                Err(QueueError::DuplicateArtifact(id))
            }
            InsertOutcome::QueueFull { size } => {
                warn!(
                    camera_id = %camera_id,
                    "Upload queue full ({} active entries), rejecting {:?}",
                    size,
                    artifact_path
                );
                Err(QueueError::QueueFull {
                    max: self.settings.max_queue_size,
                })
            }
        }
    }

    pub fn get_queue_status(&self) -> Result<QueueStatusReport, QueueError> {
        let stats = self.store.queue_stats()?;
        let recent_completed_24h = self
            .store
            .count_completed_since(unix_now() - RECENT_COMPLETED_WINDOW_SECS)?;

        Ok(QueueStatusReport {
            queue_size: stats.total(),
            pending: stats.pending,
            in_progress: stats.in_progress,
            completed: stats.completed,
            failed: stats.failed,
            recent_completed_24h,
            monitor_online: self.monitor.is_online(),
            stats: self.counters.snapshot(),
        })
    }

    /// Probe now and, when the backend is reachable, run one pass of up to
    /// `upload_batch_size` uploads. Returns immediately when offline.
    pub async fn force_process_queue(&self) -> Result<ProcessReport, QueueError> {
        if self.monitor.check_now().await != MonitorState::Online {
            info!("Forced queue processing skipped: backend unreachable");
            return Ok(ProcessReport::offline());
        }

        let report = self
            .dispatcher
            .process_batch(self.settings.upload_batch_size)
            .await?;
        info!(
            "Forced queue processing: {} attempted, {} succeeded, {} failed",
            report.attempted, report.succeeded, report.failed
        );
        // Workers pick up whatever is left.
        self.wake.notify();
        Ok(report)
    }

    /// Remove terminal entries and connectivity events older than the
    /// expiration window. Safe to run at any time.
    pub fn cleanup(&self) -> Result<CleanupReport, QueueError> {
        Ok(cleanup_expired(
            self.store.as_ref(),
            self.settings.expiration_hours,
        )?)
    }

    pub fn get_entry(&self, id: EntryId) -> Result<Option<QueueEntry>, QueueError> {
        Ok(self.store.get_entry(id)?)
    }

    pub fn list_by_status(&self, status: EntryStatus) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(self.store.list_by_status(status)?)
    }

    pub fn recent_connectivity_events(
        &self,
        limit: usize,
    ) -> Result<Vec<ConnectivityEvent>, QueueError> {
        Ok(self.store.recent_connectivity_events(limit)?)
    }
}

/// Return in-progress entries whose last attempt is older than `grace` to
/// pending.
fn recover_stale(store: &dyn UploadQueueStore, grace: Duration) -> Result<usize> {
    let grace = i64::try_from(grace.as_secs()).unwrap_or(i64::MAX);
    let recovered = store.reset_stale_in_progress(unix_now().saturating_sub(grace))?;
    if recovered > 0 {
        warn!("Recovered {} abandoned in-progress upload(s)", recovered);
    }
    Ok(recovered)
}

/// Rescan for abandoned entries every `interval`. Covers uploads aborted at
/// shutdown or by a crash shortly before this process started, which are
/// still inside the grace window at startup.
async fn run_recovery_loop(
    store: Arc<dyn UploadQueueStore>,
    wake: WakeSignal,
    grace: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) {
    debug!(
        "Stale upload scan starting (interval={}s, grace={}s)",
        interval.as_secs(),
        grace.as_secs()
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => break,
        }

        match recover_stale(store.as_ref(), grace) {
            Ok(0) => {}
            Ok(_) => wake.notify(),
            Err(e) => error!("Stale upload scan failed: {:#}", e),
        }
    }

    debug!("Stale upload scan stopped");
}

fn cleanup_expired(store: &dyn UploadQueueStore, expiration_hours: u64) -> Result<CleanupReport> {
    let expiration_secs = i64::try_from(expiration_hours.saturating_mul(3600)).unwrap_or(i64::MAX);
    let older_than = unix_now().saturating_sub(expiration_secs);

    let report = CleanupReport {
        completed_removed: store.purge(older_than, &[EntryStatus::Completed])?,
        failed_removed: store.purge(older_than, &[EntryStatus::Failed])?,
        events_removed: store.prune_connectivity_events(older_than)?,
    };

    if report.completed_removed + report.failed_removed + report.events_removed > 0 {
        info!(
            "Cleanup removed {} completed, {} failed entries and {} connectivity events",
            report.completed_removed, report.failed_removed, report.events_removed
        );
    }
    Ok(report)
}

async fn run_cleanup_loop(
    store: Arc<dyn UploadQueueStore>,
    expiration_hours: u64,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(
        "Cleanup loop starting (interval={}h)",
        interval.as_secs() / 3600
    );

    loop {
        if let Err(e) = cleanup_expired(store.as_ref(), expiration_hours) {
            error!("Upload queue cleanup failed: {:#}", e);
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => break,
        }
    }

    info!("Cleanup loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload_queue::test_support::{
        write_artifact, ProbeStep, ScriptedProbe, ScriptedUploader,
    };
    use tempfile::tempdir;

    fn manager_with(
        settings: UploadQueueSettings,
        probe: ScriptedProbe,
        uploader: Arc<ScriptedUploader>,
    ) -> (UploadQueueManager, Arc<SqliteUploadQueueStore>) {
        let store = Arc::new(SqliteUploadQueueStore::in_memory().unwrap());
        let manager =
            UploadQueueManager::with_store(store.clone(), settings, Arc::new(probe), uploader);
        (manager, store)
    }

    fn online() -> ScriptedProbe {
        ScriptedProbe::new(vec![]).with_fallback(ProbeStep::Reachable)
    }

    fn offline() -> ScriptedProbe {
        ScriptedProbe::new(vec![])
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    // === Enqueue Tests ===

    #[tokio::test]
    async fn test_enqueue_records_artifact() {
        let dir = tempdir().unwrap();
        let path = write_artifact(dir.path(), "cam1.mp4", b"frames");
        let (manager, _store) = manager_with(
            UploadQueueSettings::default(),
            offline(),
            Arc::new(ScriptedUploader::succeeding()),
        );

        let id = manager
            .enqueue(
                EnqueueRequest::new(&path, "cam1", "videos/cam1.mp4")
                    .with_session("session-7")
                    .with_location(Some("arena-2".to_string()), None),
            )
            .await
            .unwrap();

        let entry = manager.get_entry(id).unwrap().unwrap();
        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.artifact_path, path.canonicalize().unwrap());
        assert_eq!(entry.file_size, 6);
        assert!(entry.checksum.starts_with("sha256:"));
        assert_eq!(entry.priority, EnqueueRequest::DEFAULT_PRIORITY);
        assert_eq!(entry.max_retries, 5);
        assert_eq!(entry.session_id.as_deref(), Some("session-7"));
        assert_eq!(entry.arena.as_deref(), Some("arena-2"));
        assert!(entry.quadra.is_none());
    }

    #[tokio::test]
    async fn test_enqueue_missing_file() {
        let dir = tempdir().unwrap();
        let (manager, _store) = manager_with(
            UploadQueueSettings::default(),
            offline(),
            Arc::new(ScriptedUploader::succeeding()),
        );

        let result = manager
            .enqueue(EnqueueRequest::new(dir.path().join("gone.mp4"), "cam1", "x"))
            .await;
        assert!(matches!(result, Err(QueueError::ArtifactMissing(_))));
        assert_eq!(manager.get_queue_status().unwrap().queue_size, 0);
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = write_artifact(dir.path(), "cam1.mp4", b"frames");
        let (manager, _store) = manager_with(
            UploadQueueSettings::default(),
            offline(),
            Arc::new(ScriptedUploader::succeeding()),
        );

        let id = manager
            .enqueue(EnqueueRequest::new(&path, "cam1", "videos/cam1.mp4"))
            .await
            .unwrap();
        let again = manager
            .enqueue(EnqueueRequest::new(&path, "cam1", "videos/cam1.mp4"))
            .await;

        match again {
            Err(QueueError::DuplicateArtifact(existing)) => assert_eq!(existing, id),
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert_eq!(manager.get_queue_status().unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_when_full() {
        let dir = tempdir().unwrap();
        let settings = UploadQueueSettings {
            max_queue_size: 2,
            ..Default::default()
        };
        let (manager, _store) = manager_with(
            settings,
            offline(),
            Arc::new(ScriptedUploader::succeeding()),
        );

        for i in 0..2 {
            let path = write_artifact(dir.path(), &format!("{}.mp4", i), &[i as u8; 4]);
            manager
                .enqueue(EnqueueRequest::new(path, "cam1", "x"))
                .await
                .unwrap();
        }
        let path = write_artifact(dir.path(), "2.mp4", b"third");
        let result = manager.enqueue(EnqueueRequest::new(path, "cam1", "x")).await;

        assert!(matches!(result, Err(QueueError::QueueFull { max: 2 })));
        assert_eq!(manager.get_queue_status().unwrap().queue_size, 2);
    }

    // === Status Tests ===

    #[tokio::test]
    async fn test_status_on_empty_queue() {
        let (manager, _store) = manager_with(
            UploadQueueSettings::default(),
            offline(),
            Arc::new(ScriptedUploader::succeeding()),
        );

        let status = manager.get_queue_status().unwrap();
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.recent_completed_24h, 0);
        assert!(!status.monitor_online);
        assert_eq!(status.stats, UploadStats::default());
    }

    // === Force Process Tests ===

    #[tokio::test]
    async fn test_force_process_while_offline_does_nothing() {
        let dir = tempdir().unwrap();
        let uploader = Arc::new(ScriptedUploader::succeeding());
        let (manager, _store) =
            manager_with(UploadQueueSettings::default(), offline(), uploader.clone());
        let path = write_artifact(dir.path(), "a.mp4", b"a");
        manager
            .enqueue(EnqueueRequest::new(path, "cam1", "x"))
            .await
            .unwrap();

        let report = manager.force_process_queue().await.unwrap();

        assert_eq!(report, ProcessReport::offline());
        assert!(uploader.calls().is_empty());
        assert_eq!(manager.get_queue_status().unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_force_process_uploads_batch() {
        let dir = tempdir().unwrap();
        let uploader = Arc::new(ScriptedUploader::succeeding());
        let settings = UploadQueueSettings {
            upload_batch_size: 2,
            ..Default::default()
        };
        let (manager, _store) = manager_with(settings, online(), uploader.clone());
        for i in 0..3 {
            let path = write_artifact(dir.path(), &format!("{}.mp4", i), &[i as u8; 8]);
            manager
                .enqueue(EnqueueRequest::new(path, "cam1", format!("videos/{}", i)))
                .await
                .unwrap();
        }

        let report = manager.force_process_queue().await.unwrap();

        assert!(report.online);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);
        let status = manager.get_queue_status().unwrap();
        assert!(status.monitor_online);
        assert_eq!(status.completed, 2);
        assert_eq!(status.pending, 1);
        assert_eq!(status.recent_completed_24h, 2);
        assert_eq!(status.stats.success_count, 2);
        assert_eq!(status.stats.total_processed, 2);
    }

    // === Lifecycle Tests ===

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (manager, _store) = manager_with(
            UploadQueueSettings::default(),
            offline(),
            Arc::new(ScriptedUploader::succeeding()),
        );

        manager.start().unwrap();
        assert!(matches!(manager.start(), Err(QueueError::AlreadyStarted)));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_recovers_stale_in_progress() {
        let (manager, store) = manager_with(
            UploadQueueSettings::default(),
            offline(),
            Arc::new(ScriptedUploader::succeeding()),
        );
        let stale_attempt = unix_now() - 2 * 3600;
        let id = match store
            .insert(
                NewQueueEntry {
                    artifact_path: "/data/videos/cam1.mp4".into(),
                    camera_id: "cam1".to_string(),
                    session_id: None,
                    arena: None,
                    quadra: None,
                    file_size: 10,
                    checksum: "sha256:00".to_string(),
                    priority: 1,
                    max_retries: 5,
                    destination: "x".to_string(),
                    created_at: stale_attempt,
                },
                1000,
            )
            .unwrap()
        {
            InsertOutcome::Inserted(id) => id,
            other => panic!("unexpected {:?}", other),
        };
        store.claim_next_eligible(stale_attempt).unwrap().unwrap();

        manager.start().unwrap();

        let entry = store.get_entry(id).unwrap().unwrap();
        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_running_queue_recovers_entry_abandoned_inside_grace() {
        let dir = tempdir().unwrap();
        let uploader = Arc::new(ScriptedUploader::succeeding());
        let settings = UploadQueueSettings {
            connectivity_check_interval_secs: 1,
            process_interval_secs: 1,
            stale_in_progress_grace_secs: 1,
            ..Default::default()
        };
        let (manager, store) = manager_with(settings, online(), uploader.clone());

        let path = write_artifact(dir.path(), "a.mp4", b"a");
        let id = manager
            .enqueue(EnqueueRequest::new(&path, "cam1", "videos/a.mp4"))
            .await
            .unwrap();
        // Claimed just now by a run that died mid-upload
        store.claim_next_eligible(unix_now()).unwrap().unwrap();

        manager.start().unwrap();
        assert_eq!(
            store.get_entry(id).unwrap().unwrap().status,
            EntryStatus::InProgress
        );

        wait_until(|| {
            manager.get_entry(id).unwrap().unwrap().status == EntryStatus::Completed
        })
        .await;
        assert_eq!(uploader.calls().len(), 1);
        assert_eq!(manager.get_entry(id).unwrap().unwrap().retry_count, 0);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_running_queue_uploads_after_coming_online() {
        let dir = tempdir().unwrap();
        let uploader = Arc::new(ScriptedUploader::succeeding());
        let probe = ScriptedProbe::new(vec![ProbeStep::Unreachable, ProbeStep::Reachable])
            .with_fallback(ProbeStep::Reachable);
        let settings = UploadQueueSettings {
            connectivity_check_interval_secs: 1,
            ..Default::default()
        };
        let (manager, _store) = manager_with(settings, probe, uploader.clone());

        let path = write_artifact(dir.path(), "a.mp4", b"a");
        let id = manager
            .enqueue(EnqueueRequest::new(&path, "cam1", "videos/a.mp4"))
            .await
            .unwrap();
        manager.start().unwrap();

        wait_until(|| {
            manager.get_entry(id).unwrap().unwrap().status == EntryStatus::Completed
        })
        .await;
        assert!(!path.exists());

        let events = manager.recent_connectivity_events(10).unwrap();
        let states: Vec<MonitorState> = events.iter().map(|e| e.status).collect();
        assert_eq!(states, vec![MonitorState::Online, MonitorState::Offline]);
        manager.shutdown().await;
    }

    // === Cleanup Tests ===

    #[tokio::test]
    async fn test_cleanup_removes_only_expired_terminal_entries() {
        let (manager, store) = manager_with(
            UploadQueueSettings::default(),
            offline(),
            Arc::new(ScriptedUploader::succeeding()),
        );
        let now = unix_now();
        let old = now - 200 * 3600;

        let mut ids = Vec::new();
        for (i, created_at) in [old, old, now, now].into_iter().enumerate() {
            let outcome = store
                .insert(
                    NewQueueEntry {
                        artifact_path: format!("/data/videos/{}.mp4", i).into(),
                        camera_id: "cam1".to_string(),
                        session_id: None,
                        arena: None,
                        quadra: None,
                        file_size: 10,
                        checksum: format!("sha256:{}", i),
                        priority: 1,
                        max_retries: 5,
                        destination: "x".to_string(),
                        created_at,
                    },
                    1000,
                )
                .unwrap();
            match outcome {
                InsertOutcome::Inserted(id) => ids.push(id),
                other => panic!("unexpected {:?}", other),
            }
        }
        // Old completed, old failed, recent completed; the last one stays pending
        let claimed = store.claim_next_eligible(old).unwrap().unwrap();
        store.record_success(claimed.id, old).unwrap();
        let claimed = store.claim_next_eligible(old).unwrap().unwrap();
        store
            .record_terminal_failure(claimed.id, FailureKind::ArtifactMissing, "gone", old)
            .unwrap();
        let claimed = store.claim_next_eligible(now).unwrap().unwrap();
        store.record_success(claimed.id, now).unwrap();

        store
            .append_connectivity_event(&ConnectivityEvent {
                timestamp: old,
                status: MonitorState::Offline,
                latency_ms: None,
                error: Some("timeout".to_string()),
            })
            .unwrap();

        let report = manager.cleanup().unwrap();
        assert_eq!(
            report,
            CleanupReport {
                completed_removed: 1,
                failed_removed: 1,
                events_removed: 1,
            }
        );

        let status = manager.get_queue_status().unwrap();
        assert_eq!(status.completed, 1);
        assert_eq!(status.failed, 0);
        assert_eq!(status.pending, 1);

        // Idempotent
        assert_eq!(manager.cleanup().unwrap(), CleanupReport::default());
    }
}

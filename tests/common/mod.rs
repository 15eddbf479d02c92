//! Common test infrastructure
//!
//! Each test gets an isolated queue database and artifact directory, plus
//! fake probe and uploader the test can steer.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{FakeProbe, RecordingUploader, TestQueue};
//!
//! #[tokio::test]
//! async fn test_upload() {
//!     let queue = TestQueue::new(TestQueue::fast_settings(), FakeProbe::online(), RecordingUploader::new());
//!     let path = queue.write_artifact("cam1.mp4", b"frames");
//!     queue.manager.enqueue(EnqueueRequest::new(path, "cam1", "videos/cam1.mp4")).await.unwrap();
//! }
//! ```

mod fixtures;

pub use fixtures::{FakeProbe, RecordingUploader};

use offline_upload_queue::config::UploadQueueSettings;
use offline_upload_queue::upload_queue::UploadQueueManager;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Queue manager backed by a temporary database.
pub struct TestQueue {
    pub manager: UploadQueueManager,
    pub probe: Arc<FakeProbe>,
    pub uploader: Arc<RecordingUploader>,
    pub settings: UploadQueueSettings,

    // Keep the temp directories alive until drop
    db_dir: TempDir,
    artifact_dir: TempDir,
}

impl TestQueue {
    pub fn new(settings: UploadQueueSettings, probe: FakeProbe, uploader: RecordingUploader) -> Self {
        let db_dir = TempDir::new().unwrap();
        let artifact_dir = TempDir::new().unwrap();
        let probe = Arc::new(probe);
        let uploader = Arc::new(uploader);
        let manager = UploadQueueManager::open(
            db_dir.path().join("upload_queue.db"),
            settings.clone(),
            probe.clone(),
            uploader.clone(),
        )
        .unwrap();

        Self {
            manager,
            probe,
            uploader,
            settings,
            db_dir,
            artifact_dir,
        }
    }

    /// Settings tuned so background loops react within a test's lifetime.
    pub fn fast_settings() -> UploadQueueSettings {
        UploadQueueSettings {
            connectivity_check_interval_secs: 1,
            probe_timeout_secs: 1,
            process_interval_secs: 1,
            shutdown_grace_secs: 5,
            ..Default::default()
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir.path().join("upload_queue.db")
    }

    /// Drop the current manager without shutting it down and open a new one
    /// on the same database, as after a crash.
    pub fn reopen(self, settings: UploadQueueSettings) -> Self {
        let TestQueue {
            manager,
            probe,
            uploader,
            db_dir,
            artifact_dir,
            ..
        } = self;
        drop(manager);

        let manager = UploadQueueManager::open(
            db_dir.path().join("upload_queue.db"),
            settings.clone(),
            probe.clone(),
            uploader.clone(),
        )
        .unwrap();

        Self {
            manager,
            probe,
            uploader,
            settings,
            db_dir,
            artifact_dir,
        }
    }

    #[allow(dead_code)]
    pub fn artifact_dir(&self) -> &Path {
        self.artifact_dir.path()
    }

    pub fn write_artifact(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.artifact_dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}

/// Poll `condition` until it holds or [`WAIT_TIMEOUT`] elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

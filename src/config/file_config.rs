use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub backend_url: Option<String>,
    pub health_path: Option<String>,
    pub auth_token: Option<String>,
    pub upload_timeout_secs: Option<u64>,

    // Feature configs
    pub upload_queue: Option<UploadQueueConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct UploadQueueConfig {
    pub max_retry_attempts: Option<u32>,
    pub retry_delay_base_secs: Option<u64>,
    pub max_retry_delay_secs: Option<u64>,
    pub connectivity_check_interval_secs: Option<u64>,
    pub probe_timeout_secs: Option<u64>,
    pub upload_batch_size: Option<usize>,
    pub max_queue_size: Option<usize>,
    pub expiration_hours: Option<u64>,
    pub delete_after_upload: Option<bool>,
    pub process_interval_secs: Option<u64>,
    pub stale_in_progress_grace_secs: Option<u64>,
    pub cleanup_interval_hours: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

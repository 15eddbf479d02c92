mod file_config;

pub use file_config::{FileConfig, UploadQueueConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_HEALTH_PATH: &str = "/rest/v1/";
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 300;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub backend_url: Option<String>,
    pub auth_token: Option<String>,
    pub health_path: Option<String>,
    pub upload_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    /// None when no backend URL is configured; only offline subcommands work then.
    pub backend: Option<BackendSettings>,
    pub upload_queue: UploadQueueSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let backend_url = file.backend_url.or_else(|| cli.backend_url.clone());
        let backend = match backend_url {
            Some(base_url) => {
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    bail!("backend_url must be an http(s) URL: {}", base_url);
                }
                Some(BackendSettings {
                    base_url,
                    health_path: file
                        .health_path
                        .or_else(|| cli.health_path.clone())
                        .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string()),
                    auth_token: file.auth_token.or_else(|| cli.auth_token.clone()),
                    upload_timeout_secs: file
                        .upload_timeout_secs
                        .or(cli.upload_timeout_secs)
                        .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS),
                })
            }
            None => None,
        };

        // Upload queue settings - merge file config with defaults
        let defaults = UploadQueueSettings::default();
        let uq_file = file.upload_queue.unwrap_or_default();
        let upload_queue = UploadQueueSettings {
            max_retry_attempts: uq_file
                .max_retry_attempts
                .unwrap_or(defaults.max_retry_attempts),
            retry_delay_base_secs: uq_file
                .retry_delay_base_secs
                .unwrap_or(defaults.retry_delay_base_secs),
            max_retry_delay_secs: uq_file
                .max_retry_delay_secs
                .unwrap_or(defaults.max_retry_delay_secs),
            connectivity_check_interval_secs: uq_file
                .connectivity_check_interval_secs
                .unwrap_or(defaults.connectivity_check_interval_secs),
            probe_timeout_secs: uq_file
                .probe_timeout_secs
                .unwrap_or(defaults.probe_timeout_secs),
            upload_batch_size: uq_file
                .upload_batch_size
                .unwrap_or(defaults.upload_batch_size),
            max_queue_size: uq_file.max_queue_size.unwrap_or(defaults.max_queue_size),
            expiration_hours: uq_file
                .expiration_hours
                .unwrap_or(defaults.expiration_hours),
            delete_after_upload: uq_file
                .delete_after_upload
                .unwrap_or(defaults.delete_after_upload),
            process_interval_secs: uq_file
                .process_interval_secs
                .unwrap_or(defaults.process_interval_secs),
            stale_in_progress_grace_secs: uq_file
                .stale_in_progress_grace_secs
                .unwrap_or(defaults.stale_in_progress_grace_secs),
            cleanup_interval_hours: uq_file
                .cleanup_interval_hours
                .unwrap_or(defaults.cleanup_interval_hours),
            shutdown_grace_secs: uq_file
                .shutdown_grace_secs
                .unwrap_or(defaults.shutdown_grace_secs),
        };
        upload_queue.validate()?;
        if let Some(backend) = &backend {
            // The periodic stale scan must never reset an upload still in flight.
            if backend.upload_timeout_secs >= upload_queue.stale_in_progress_grace_secs {
                bail!(
                    "stale_in_progress_grace_secs ({}) must be greater than upload_timeout_secs ({})",
                    upload_queue.stale_in_progress_grace_secs,
                    backend.upload_timeout_secs
                );
            }
        }

        Ok(Self {
            db_dir,
            backend,
            upload_queue,
        })
    }

    pub fn upload_queue_db_path(&self) -> PathBuf {
        self.db_dir.join("upload_queue.db")
    }
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    /// Path probed for reachability, relative to `base_url`.
    pub health_path: String,
    pub auth_token: Option<String>,
    pub upload_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct UploadQueueSettings {
    pub max_retry_attempts: u32,
    pub retry_delay_base_secs: u64,
    pub max_retry_delay_secs: u64,
    pub connectivity_check_interval_secs: u64,
    pub probe_timeout_secs: u64,
    /// Number of concurrent upload workers.
    pub upload_batch_size: usize,
    /// Cap on pending + in-progress entries.
    pub max_queue_size: usize,
    /// Age after which terminal entries and connectivity events are purged.
    pub expiration_hours: u64,
    pub delete_after_upload: bool,
    /// Fallback tick for idle workers.
    pub process_interval_secs: u64,
    pub stale_in_progress_grace_secs: u64,
    pub cleanup_interval_hours: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for UploadQueueSettings {
    fn default() -> Self {
        Self {
            max_retry_attempts: 5,
            retry_delay_base_secs: 60,
            max_retry_delay_secs: 3600,
            connectivity_check_interval_secs: 30,
            probe_timeout_secs: 10,
            upload_batch_size: 3,
            max_queue_size: 1000,
            expiration_hours: 168, // 7 days
            delete_after_upload: true,
            process_interval_secs: 60,
            stale_in_progress_grace_secs: 3600,
            cleanup_interval_hours: 24,
            shutdown_grace_secs: 30,
        }
    }
}

impl UploadQueueSettings {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours.saturating_mul(3600))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retry_attempts == 0 {
            bail!("max_retry_attempts must be at least 1");
        }
        if self.upload_batch_size == 0 {
            bail!("upload_batch_size must be at least 1");
        }
        if self.max_queue_size == 0 {
            bail!("max_queue_size must be at least 1");
        }
        if self.connectivity_check_interval_secs == 0 {
            bail!("connectivity_check_interval_secs must be at least 1");
        }
        if self.probe_timeout_secs == 0 {
            bail!("probe_timeout_secs must be at least 1");
        }
        if self.process_interval_secs == 0 {
            bail!("process_interval_secs must be at least 1");
        }
        if self.cleanup_interval_hours == 0 {
            bail!("cleanup_interval_hours must be at least 1");
        }
        Ok(())
    }
}

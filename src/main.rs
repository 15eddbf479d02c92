use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use offline_upload_queue::backend::{HttpConnectivityProbe, HttpUploader, Unreachable};
use offline_upload_queue::config::{AppConfig, CliConfig, FileConfig};
use offline_upload_queue::upload_queue::{EnqueueRequest, UploadQueueManager};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(name = "upload-queue", version)]
struct CliArgs {
    /// Directory holding the upload queue database.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Base URL of the storage backend.
    #[clap(long)]
    pub backend_url: Option<String>,

    /// Bearer token sent with every upload.
    #[clap(long, env = "UPLOAD_QUEUE_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Path probed for reachability, relative to the backend URL.
    #[clap(long)]
    pub health_path: Option<String>,

    /// Timeout in seconds for a single upload request.
    #[clap(long)]
    pub upload_timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the upload daemon until interrupted.
    Run,

    /// Add a recorded artifact to the queue.
    Enqueue {
        #[clap(value_parser = parse_path)]
        artifact_path: PathBuf,

        #[clap(long)]
        camera_id: String,

        /// Backend path (or absolute URL) the artifact is uploaded to.
        #[clap(long)]
        destination: String,

        #[clap(long)]
        session_id: Option<String>,

        #[clap(long)]
        arena: Option<String>,

        #[clap(long)]
        quadra: Option<String>,

        /// Higher values are uploaded first.
        #[clap(long, default_value_t = EnqueueRequest::DEFAULT_PRIORITY)]
        priority: i32,
    },

    /// Print queue counts as JSON.
    Status,

    /// Remove expired terminal entries and connectivity events.
    Cleanup,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            backend_url: self.backend_url.clone(),
            auth_token: self.auth_token.clone(),
            health_path: self.health_path.clone(),
            upload_timeout_secs: self.upload_timeout_secs,
        }
    }
}

/// Manager for subcommands that only touch the local database.
fn open_offline(config: &AppConfig) -> Result<UploadQueueManager> {
    Ok(UploadQueueManager::open(
        config.upload_queue_db_path(),
        config.upload_queue.clone(),
        Arc::new(Unreachable),
        Arc::new(Unreachable),
    )?)
}

async fn run_daemon(config: &AppConfig) -> Result<()> {
    let backend = config
        .backend
        .as_ref()
        .context("backend_url must be specified via --backend-url or in config file")?;

    let probe = HttpConnectivityProbe::new(
        backend,
        Duration::from_secs(config.upload_queue.probe_timeout_secs),
    )?;
    info!("Probing backend at {}", probe.health_url());
    let uploader = HttpUploader::new(backend)?;

    let manager = UploadQueueManager::open(
        config.upload_queue_db_path(),
        config.upload_queue.clone(),
        Arc::new(probe),
        Arc::new(uploader),
    )?;
    manager.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    manager.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    match cli_args.command {
        Command::Run => run_daemon(&config).await?,
        Command::Enqueue {
            artifact_path,
            camera_id,
            destination,
            session_id,
            arena,
            quadra,
            priority,
        } => {
            let manager = open_offline(&config)?;
            let mut request = EnqueueRequest::new(artifact_path, camera_id, destination)
                .with_location(arena, quadra)
                .with_priority(priority);
            request.session_id = session_id;
            let id = manager.enqueue(request).await?;
            println!("{}", id);
        }
        Command::Status => {
            let manager = open_offline(&config)?;
            let status = manager.get_queue_status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Cleanup => {
            let manager = open_offline(&config)?;
            let report = manager.cleanup()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

//! HTTP adapters for the storage backend.
//!
//! Provides the reachability probe and the streaming uploader the daemon
//! plugs into the upload queue.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use reqwest::{Body, Client, StatusCode};
use tokio::io::BufReader;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::config::BackendSettings;
use crate::upload_queue::{ConnectivityProbe, ProbeOutcome, Uploader};

const CLIENT_USER_AGENT: &str = concat!("upload-queue/", env!("CARGO_PKG_VERSION"));
const UPLOAD_BUFFER_SIZE: usize = 64 * 1024;

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Join `base_url` and a relative `path`. Absolute http(s) URLs are kept as is.
pub fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Probes the backend health endpoint.
///
/// Any HTTP answer that proves the service is up counts as reachable,
/// including 401 and 403 for endpoints that require credentials.
#[derive(Clone)]
pub struct HttpConnectivityProbe {
    client: Client,
    health_url: String,
}

impl HttpConnectivityProbe {
    pub fn new(settings: &BackendSettings, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            health_url: resolve_url(&settings.base_url, &settings.health_path),
        })
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }
}

fn is_service_up(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn probe(&self) -> Result<ProbeOutcome> {
        let started = Instant::now();
        let response = self
            .client
            .get(&self.health_url)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(ACCEPT, "application/json")
            .send()
            .await;
        let latency = started.elapsed();

        Ok(match response {
            Ok(response) if is_service_up(response.status()) => ProbeOutcome::reachable(latency),
            Ok(response) => ProbeOutcome::unreachable(
                latency,
                format!("health check returned {}", response.status()),
            ),
            Err(e) => ProbeOutcome::unreachable(latency, e.to_string()),
        })
    }
}

/// Streams artifacts to the backend with `PUT <base_url>/<destination>`.
#[derive(Clone)]
pub struct HttpUploader {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpUploader {
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(settings.upload_timeout_secs))?,
            base_url: settings.base_url.clone(),
            auth_token: settings.auth_token.clone(),
        })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, artifact_path: &Path, destination: &str) -> Result<()> {
        let url = resolve_url(&self.base_url, destination);
        let file = tokio::fs::File::open(artifact_path)
            .await
            .with_context(|| format!("Failed to open {:?}", artifact_path))?;
        let file_size = file.metadata().await?.len();

        let reader = BufReader::with_capacity(UPLOAD_BUFFER_SIZE, file);
        let stream = ReaderStream::with_capacity(reader, UPLOAD_BUFFER_SIZE);

        let mut request = self
            .client
            .put(&url)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(CONTENT_TYPE, "video/mp4")
            .header(CONTENT_LENGTH, file_size)
            .body(Body::wrap_stream(stream));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Upload request to {} failed", url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Backend returned {} for {}: {}", status, url, body.trim());
        }

        debug!("Uploaded {} bytes to {}", file_size, url);
        Ok(())
    }
}

/// Stand-in for processes that only touch the local queue database.
///
/// Never reachable and refuses every upload, so no worker ever claims an
/// entry through it.
pub struct Unreachable;

#[async_trait]
impl ConnectivityProbe for Unreachable {
    async fn probe(&self) -> Result<ProbeOutcome> {
        Ok(ProbeOutcome::unreachable(
            Duration::ZERO,
            "no backend configured",
        ))
    }
}

#[async_trait]
impl Uploader for Unreachable {
    async fn upload(&self, _artifact_path: &Path, _destination: &str) -> Result<()> {
        bail!("no backend configured")
    }
}

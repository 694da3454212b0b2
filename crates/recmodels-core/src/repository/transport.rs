//! Transports that copy a remote artifact into a local file.

use super::retry::{retry_async, RetryConfig};
use crate::cancel::CancellationToken;
use crate::config::{ModelsSettings, NetworkConfig};
use crate::error::{ModelsError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use url::Url;

/// Receives the running byte count of a transfer.
pub type Progress<'a> = &'a (dyn Fn(u64) + Send + Sync);

/// Fetches one remote resource into `dest`.
///
/// Implementations report a missing resource as [`ModelsError::NotFound`],
/// check `cancel` between chunks and sync `dest` to disk before returning.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &Url, dest: &Path, cancel: &CancellationToken) -> Result<u64>;

    /// [`fetch`](Self::fetch) that reports progress. The default reports
    /// once, after the transfer completed.
    async fn fetch_with_progress(
        &self,
        url: &Url,
        dest: &Path,
        cancel: &CancellationToken,
        progress: Progress<'_>,
    ) -> Result<u64> {
        let written = self.fetch(url, dest, cancel).await?;
        progress(written);
        Ok(written)
    }
}

fn no_progress(_: u64) {}

/// Pick the transport for a remote: `file://` URLs are copied locally,
/// everything else goes over HTTP.
pub fn transport_for(settings: &ModelsSettings) -> Result<Box<dyn Transport>> {
    let remote = Url::parse(&settings.remote_url).map_err(|e| ModelsError::Config {
        message: format!("Invalid remote URL {}: {}", settings.remote_url, e),
    })?;
    if remote.scheme() == "file" {
        Ok(Box::new(FileTransport))
    } else {
        Ok(Box::new(HttpTransport::new(settings)?))
    }
}

async fn create_dest(dest: &Path) -> Result<tokio::fs::File> {
    tokio::fs::File::create(dest)
        .await
        .map_err(|e| ModelsError::io_with_path(e, dest))
}

/// Flush and fsync, so a later rename never publishes unwritten data.
async fn finish_dest(mut file: tokio::fs::File, dest: &Path) -> Result<()> {
    file.flush()
        .await
        .map_err(|e| ModelsError::io_with_path(e, dest))?;
    file.sync_all()
        .await
        .map_err(|e| ModelsError::io_with_path(e, dest))
}

/// HTTP(S) transport with timeouts, proxy, basic auth and retries.
pub struct HttpTransport {
    client: Client,
    credentials: Option<(String, String)>,
    retry: RetryConfig,
}

impl HttpTransport {
    /// Client configured from the timeouts, proxy and credentials in `settings`.
    pub fn new(settings: &ModelsSettings) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT);

        if let Some(proxy) = &settings.proxy {
            let mut reqwest_proxy =
                reqwest::Proxy::all(proxy.url()).map_err(|e| ModelsError::Config {
                    message: format!("Invalid proxy {}: {}", proxy.url(), e),
                })?;
            if let (Some(user), Some(password)) = (&proxy.user, &proxy.password) {
                reqwest_proxy = reqwest_proxy.basic_auth(user, password);
            }
            builder = builder.proxy(reqwest_proxy);
        }

        let client = builder.build().map_err(|e| ModelsError::Network {
            message: format!("Failed to create HTTP client: {}", e),
            cause: None,
        })?;

        Ok(Self {
            client,
            credentials: settings
                .auth
                .as_ref()
                .map(|auth| (auth.user.clone(), auth.password.clone())),
            retry: RetryConfig::new(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_once(
        &self,
        url: &Url,
        dest: &Path,
        cancel: &CancellationToken,
        progress: Progress<'_>,
    ) -> Result<u64> {
        cancel.check()?;
        let mut request = self.client.get(url.clone());
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ModelsError::NotFound {
                coordinate: url.to_string(),
            });
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ModelsError::Network {
                message: format!("GET {} returned {}", url, status),
                cause: None,
            });
        }
        if !status.is_success() {
            return Err(ModelsError::DownloadFailed {
                url: url.to_string(),
                message: format!("status {}", status),
            });
        }

        let mut file = create_dest(dest).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            cancel.check()?;
            let chunk = chunk.map_err(|e| ModelsError::Network {
                message: format!("Error reading {}: {}", url, e),
                cause: None,
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ModelsError::io_with_path(e, dest))?;
            written += chunk.len() as u64;
            progress(written);
        }
        finish_dest(file, dest).await?;
        Ok(written)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &Url, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
        self.fetch_with_progress(url, dest, cancel, &no_progress)
            .await
    }

    async fn fetch_with_progress(
        &self,
        url: &Url,
        dest: &Path,
        cancel: &CancellationToken,
        progress: Progress<'_>,
    ) -> Result<u64> {
        let (result, attempts) = retry_async(
            &self.retry,
            || self.fetch_once(url, dest, cancel, progress),
            |e: &ModelsError| e.is_retryable() && !cancel.is_cancelled(),
        )
        .await;
        if attempts > 1 {
            debug!("GET {} took {} attempts", url, attempts);
        }
        result
    }
}

/// Copies from a `file://` remote, e.g. a mirrored repository on disk.
#[derive(Debug, Default)]
pub struct FileTransport;

#[async_trait]
impl Transport for FileTransport {
    async fn fetch(&self, url: &Url, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
        self.fetch_with_progress(url, dest, cancel, &no_progress)
            .await
    }

    async fn fetch_with_progress(
        &self,
        url: &Url,
        dest: &Path,
        cancel: &CancellationToken,
        progress: Progress<'_>,
    ) -> Result<u64> {
        let source = url.to_file_path().map_err(|_| ModelsError::DownloadFailed {
            url: url.to_string(),
            message: "not a local file URL".to_string(),
        })?;
        let mut input = match tokio::fs::File::open(&source).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModelsError::NotFound {
                    coordinate: url.to_string(),
                })
            }
            Err(e) => return Err(ModelsError::io_with_path(e, source)),
        };

        let mut output = create_dest(dest).await?;
        let mut buffer = vec![0u8; NetworkConfig::DOWNLOAD_CHUNK_SIZE];
        let mut written: u64 = 0;
        loop {
            cancel.check()?;
            let read = input
                .read(&mut buffer)
                .await
                .map_err(|e| ModelsError::io_with_path(e, &source))?;
            if read == 0 {
                break;
            }
            output
                .write_all(&buffer[..read])
                .await
                .map_err(|e| ModelsError::io_with_path(e, dest))?;
            written += read as u64;
            progress(written);
        }
        finish_dest(output, dest).await?;
        Ok(written)
    }
}

//! Downloads a single artifact into its final location.
//!
//! Bytes land in `<dest>.part` first. The partial file is moved into place
//! only after the transfer and the optional checksum check succeed, so a
//! half-written archive never appears at the deterministic path.

use super::layout;
use super::transport::{Progress, Transport};
use crate::cancel::CancellationToken;
use crate::config::NetworkConfig;
use crate::error::{ModelsError, Result};
use crate::hashing;
use fs2::FileExt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Moves remote artifacts into the local repository.
#[derive(Clone)]
pub struct DownloadManager {
    transport: Arc<dyn Transport>,
    verify_checksums: bool,
}

impl DownloadManager {
    /// With `verify_checksums`, downloads are compared against the remote's
    /// `.sha256` sidecar when one is published.
    pub fn new(transport: Arc<dyn Transport>, verify_checksums: bool) -> Self {
        Self {
            transport,
            verify_checksums,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Download `url` to `dest`. Returns the number of bytes transferred.
    pub async fn download(&self, url: &Url, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
        self.download_with_progress(url, dest, cancel, &|_| {}).await
    }

    /// [`download`](Self::download) reporting the bytes received so far.
    pub async fn download_with_progress(
        &self,
        url: &Url,
        dest: &Path,
        cancel: &CancellationToken,
        progress: Progress<'_>,
    ) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ModelsError::io_with_path(e, parent))?;
        }

        let temp = layout::temp_path(dest);
        let result = self.download_to_temp(url, &temp, cancel, progress).await;
        let written = match result {
            Ok(written) => written,
            Err(e) => {
                remove_quietly(&temp).await;
                return Err(e);
            }
        };

        let final_path = dest.to_path_buf();
        let temp_for_move = temp.clone();
        let moved = tokio::task::spawn_blocking(move || move_into_place(&temp_for_move, &final_path))
            .await
            .map_err(|e| ModelsError::Other(format!("Install task failed: {}", e)))
            .and_then(|r| r);
        if let Err(e) = moved {
            remove_quietly(&temp).await;
            return Err(e);
        }

        debug!("Downloaded {} ({} bytes) to {}", url, written, dest.display());
        Ok(written)
    }

    async fn download_to_temp(
        &self,
        url: &Url,
        temp: &Path,
        cancel: &CancellationToken,
        progress: Progress<'_>,
    ) -> Result<u64> {
        let written = self
            .transport
            .fetch_with_progress(url, temp, cancel, progress)
            .await?;
        cancel.check()?;

        if self.verify_checksums {
            if let Some(expected) = self.fetch_checksum(url, temp, cancel).await? {
                let actual = hashing::sha256_file(temp)?;
                if actual != expected {
                    warn!("Checksum mismatch for {}", url);
                    return Err(ModelsError::ChecksumMismatch { expected, actual });
                }
            }
        }
        Ok(written)
    }

    /// The published digest for `url`, or `None` when the remote has no sidecar.
    async fn fetch_checksum(
        &self,
        url: &Url,
        temp: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let checksum_url = Url::parse(&format!("{}{}", url, NetworkConfig::CHECKSUM_SUFFIX))
            .map_err(|e| ModelsError::DownloadFailed {
                url: url.to_string(),
                message: format!("bad checksum URL: {}", e),
            })?;
        let sidecar = layout::checksum_path(temp);

        let fetched = self.transport.fetch(&checksum_url, &sidecar, cancel).await;
        let contents = match fetched {
            Ok(_) => tokio::fs::read_to_string(&sidecar)
                .await
                .map_err(|e| ModelsError::io_with_path(e, &sidecar)),
            Err(e) if e.is_not_found() => {
                debug!("No checksum published for {}", url);
                remove_quietly(&sidecar).await;
                return Ok(None);
            }
            Err(e) => Err(e),
        };
        remove_quietly(&sidecar).await;

        let contents = contents?;
        match hashing::parse_checksum_file(&contents) {
            Some(digest) => Ok(Some(digest)),
            None => Err(ModelsError::DownloadFailed {
                url: checksum_url.to_string(),
                message: "malformed checksum file".to_string(),
            }),
        }
    }
}

/// Rename `temp` to `dest` while holding an exclusive lock on `dest.lock`,
/// so two processes sharing a repository never interleave installs.
fn move_into_place(temp: &Path, dest: &Path) -> Result<()> {
    let lock_path = layout::lock_path(dest);
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| ModelsError::io_with_path(e, &lock_path))?;
    lock_file
        .lock_exclusive()
        .map_err(|e| ModelsError::io_with_path(e, &lock_path))?;

    let renamed = std::fs::rename(temp, dest).map_err(|e| ModelsError::io_with_path(e, dest));

    if let Err(e) = FileExt::unlock(&lock_file) {
        warn!("Failed to release {}: {}", lock_path.display(), e);
    }
    drop(lock_file);
    let _ = std::fs::remove_file(&lock_path);
    renamed
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// Join a relative artifact path onto the remote base URL.
pub fn artifact_url(remote: &Url, relative: &str) -> Result<Url> {
    let mut base = remote.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(relative).map_err(|e| ModelsError::DownloadFailed {
        url: format!("{}{}", remote, relative),
        message: e.to_string(),
    })
}

//! Streamed artifact download with free-space guard and progress sampling

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::progress::DownloadProgress;
use super::source::{RemoteMetadata, Transfer, UpdateSource};
use super::space::DiskSpace;
use crate::error::DownloadError;

/// How often progress is logged while a transfer is running
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Required free space as a multiple of the payload size
pub const SPACE_HEADROOM: u64 = 3;

/// A transfer that delivers nothing for this long is abandoned
pub const DOWNLOAD_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

const FALLBACK_FILE_NAME: &str = "download";

/// A completed download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    /// Local payload file
    pub path: PathBuf,
    /// Bytes written
    pub size: u64,
    /// URL that was requested
    pub source_url: String,
    /// URL the payload was finally served from
    pub final_url: String,
    /// Length reported by the server (0 when unreported)
    pub content_length: u64,
    pub etag: String,
    pub elapsed: Duration,
}

/// Pick the download directory: configured, then per-instance cache, then temp.
///
/// Each candidate is created on demand; a candidate that cannot be created is
/// skipped.
pub fn resolve_destination(configured: Option<&Path>, cache_dir: &Path) -> PathBuf {
    for dir in configured.into_iter().chain([cache_dir]) {
        match std::fs::create_dir_all(dir) {
            Ok(()) => return dir.to_path_buf(),
            Err(e) => warn!("cannot use download destination {}: {e}", dir.display()),
        }
    }
    std::env::temp_dir()
}

/// A transfer whose headers passed validation and whose body has not been read
pub struct PendingDownload {
    transfer: Box<dyn Transfer>,
    metadata: RemoteMetadata,
    source_url: String,
    dest_dir: PathBuf,
    path: PathBuf,
}

/// Start a transfer of `url` into `dest_dir`.
///
/// Fails on transport errors, non-success statuses, or when the reported size
/// does not fit the destination volume (the transfer is dropped, which cancels
/// it).
pub async fn start_download(
    source: &dyn UpdateSource,
    disk: &dyn DiskSpace,
    url: &str,
    dest_dir: &Path,
    cancel: &CancellationToken,
) -> Result<PendingDownload, DownloadError> {
    info!("downloading update from: {url}");

    let transfer = tokio::select! {
        _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        res = tokio::time::timeout(DOWNLOAD_INACTIVITY_TIMEOUT, source.get(url)) => match res {
            Ok(transfer) => transfer.map_err(|err| DownloadError::Transport {
                url: url.to_string(),
                source: err,
            })?,
            Err(_) => {
                return Err(DownloadError::Stalled {
                    url: url.to_string(),
                    bytes_downloaded: 0,
                    idle: DOWNLOAD_INACTIVITY_TIMEOUT,
                });
            }
        },
    };

    let metadata = transfer.metadata().clone();
    if !metadata.is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status: metadata.status,
        });
    }

    if let Some(length) = metadata.content_length {
        ensure_space(disk, dest_dir, length)?;
    }

    let path = dest_dir.join(payload_file_name(&metadata, url));
    Ok(PendingDownload {
        transfer,
        metadata,
        source_url: url.to_string(),
        dest_dir: dest_dir.to_path_buf(),
        path,
    })
}

impl PendingDownload {
    /// Where the payload is being written
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream the body to disk. A partially written file is left in place on error.
    pub async fn finish(
        mut self,
        disk: &dyn DiskSpace,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult, DownloadError> {
        let mut file = tokio::fs::File::create(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;

        let mut progress = DownloadProgress::new(self.metadata.content_length);
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + PROGRESS_INTERVAL,
            PROGRESS_INTERVAL,
        );
        // Re-armed on every chunk, so it measures time since data last arrived
        let stall = tokio::time::sleep(DOWNLOAD_INACTIVITY_TIMEOUT);
        tokio::pin!(stall);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                _ = &mut stall => {
                    return Err(DownloadError::Stalled {
                        url: self.source_url.clone(),
                        bytes_downloaded: progress.bytes_downloaded,
                        idle: DOWNLOAD_INACTIVITY_TIMEOUT,
                    });
                }
                _ = ticker.tick() => debug!("{progress}"),
                chunk = self.transfer.chunk() => match chunk {
                    Ok(Some(bytes)) => {
                        file.write_all(&bytes)
                            .await
                            .map_err(|e| io_error(&self.path, e))?;
                        progress.advance(bytes.len());
                        stall
                            .as_mut()
                            .reset(tokio::time::Instant::now() + DOWNLOAD_INACTIVITY_TIMEOUT);
                    }
                    Ok(None) => break,
                    Err(err) => {
                        return Err(DownloadError::Transport {
                            url: self.source_url.clone(),
                            source: err,
                        });
                    }
                },
            }
        }

        file.flush().await.map_err(|e| io_error(&self.path, e))?;
        drop(file);
        debug!("{progress}");

        // Unknown length: check against what actually arrived
        if self.metadata.content_length.is_none() {
            ensure_space(disk, &self.dest_dir, progress.bytes_downloaded)?;
        }

        info!("update saved to {}", self.path.display());

        let final_url = if self.metadata.url.is_empty() {
            self.source_url.clone()
        } else {
            self.metadata.url.clone()
        };
        Ok(DownloadResult {
            path: self.path,
            size: progress.bytes_downloaded,
            source_url: self.source_url,
            final_url,
            content_length: self.metadata.content_length.unwrap_or(0),
            etag: self.metadata.etag,
            elapsed: progress.elapsed(),
        })
    }
}

/// Download `url` into `dest_dir` in one step.
pub async fn download(
    source: &dyn UpdateSource,
    disk: &dyn DiskSpace,
    url: &str,
    dest_dir: &Path,
    cancel: &CancellationToken,
) -> Result<DownloadResult, DownloadError> {
    start_download(source, disk, url, dest_dir, cancel)
        .await?
        .finish(disk, cancel)
        .await
}

fn ensure_space(disk: &dyn DiskSpace, dir: &Path, size: u64) -> Result<(), DownloadError> {
    let required = size.saturating_mul(SPACE_HEADROOM);
    match disk.available(dir) {
        Ok(available) if available < required => Err(DownloadError::InsufficientSpace {
            path: dir.to_path_buf(),
            available,
            required,
        }),
        Ok(_) => Ok(()),
        Err(e) => {
            warn!("could not check free space on {}: {e}", dir.display());
            Ok(())
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DownloadError {
    DownloadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn payload_file_name(metadata: &RemoteMetadata, requested: &str) -> String {
    metadata
        .file_name
        .clone()
        .or_else(|| url_file_name(&metadata.url))
        .or_else(|| url_file_name(requested))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

fn url_file_name(raw: &str) -> Option<String> {
    let url = url::Url::parse(raw).ok()?;
    let last = url.path_segments()?.next_back()?;
    (!last.is_empty() && last != "." && last != "..").then(|| last.to_string())
}

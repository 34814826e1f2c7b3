use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::DownloadError;
use crate::http::HttpClient;
use crate::model::Attachment;
use crate::progress::{ProgressEvent, SharedProgressReporter};

use super::filename::resolve_collision;

/// Suffix of in-flight downloads; such files are never visible under the final name
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Who is downloading what, for progress reporting
#[derive(Debug, Clone, Default)]
pub struct DownloadContext {
    /// Worker ID (0 to update_threads-1) for progress bar management
    pub worker: usize,
    pub subscription: String,
    pub episode_title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The attachment already had a local file
    Skipped,
    Downloaded { bytes: u64 },
}

/// Fetches attachments atomically into place
#[derive(Clone)]
pub struct Downloader {
    client: Arc<dyn HttpClient>,
    reporter: SharedProgressReporter,
}

/// `<path>.partial` next to the final destination
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

impl Downloader {
    pub fn new(client: Arc<dyn HttpClient>, reporter: SharedProgressReporter) -> Self {
        Self { client, reporter }
    }

    /// Download `attachment` to `destination`.
    ///
    /// Does nothing if the attachment's file already exists, unless `force`
    /// is set. The body is streamed into `<destination>.partial` and renamed
    /// into place once complete. A taken destination that does not belong to
    /// this attachment gets a `-N` suffix. On success `local_path` is set;
    /// on failure it is left untouched.
    pub async fn download(
        &self,
        attachment: &mut Attachment,
        destination: &Path,
        force: bool,
        context: &DownloadContext,
    ) -> Result<DownloadOutcome, DownloadError> {
        if !force && attachment.is_downloaded() {
            debug!(url = %attachment.url, "Attachment already downloaded");
            return Ok(DownloadOutcome::Skipped);
        }

        let previous = attachment.local_path.clone();
        let destination = resolve_collision(destination, previous.as_deref())?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::FileCreateFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let partial = partial_path(&destination);
        let bytes = match self.fetch_to(&attachment.url, &partial, context).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                self.reporter.report(ProgressEvent::DownloadFailed {
                    worker: context.worker,
                    episode_title: context.episode_title.clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        // The destination may have been taken while the body was streaming
        let destination = match resolve_collision(&destination, previous.as_deref()) {
            Ok(destination) => destination,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e.into());
            }
        };

        if let Err(e) = finalize(&partial, &destination).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        // A forced download under a new name must not leave the old file behind
        if let Some(old) = previous.filter(|old| *old != destination)
            && let Err(e) = tokio::fs::remove_file(&old).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %old.display(), error = %e, "Failed to remove replaced file");
        }

        attachment.local_path = Some(destination);

        self.reporter.report(ProgressEvent::DownloadCompleted {
            worker: context.worker,
            episode_title: context.episode_title.clone(),
            bytes_downloaded: bytes,
        });

        Ok(DownloadOutcome::Downloaded { bytes })
    }

    /// Stream `url` into `path`, returning the number of bytes written
    async fn fetch_to(
        &self,
        url: &str,
        path: &Path,
        context: &DownloadContext,
    ) -> Result<u64, DownloadError> {
        let response = self
            .client
            .get_stream(url)
            .await
            .map_err(|e| DownloadError::HttpFailed {
                url: url.to_string(),
                source: e,
            })?;

        if response.status >= 400 {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            });
        }

        self.reporter.report(ProgressEvent::DownloadStarting {
            worker: context.worker,
            subscription: context.subscription.clone(),
            episode_title: context.episode_title.clone(),
            content_length: response.content_length,
        });

        let mut file = File::create(path)
            .await
            .map_err(|e| DownloadError::FileCreateFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut bytes_downloaded: u64 = 0;
        let mut stream = response.body;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
                url: url.to_string(),
                source: e,
            })?;

            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::FileWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;

            bytes_downloaded += chunk.len() as u64;

            self.reporter.report(ProgressEvent::DownloadProgress {
                worker: context.worker,
                bytes_downloaded,
                total_bytes: response.content_length,
            });
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(bytes_downloaded)
    }
}

/// Move a completed `.partial` into place and make it world-readable
async fn finalize(partial: &Path, destination: &Path) -> Result<(), DownloadError> {
    let finalize_failed = |e: std::io::Error| DownloadError::FinalizeFailed {
        path: destination.to_path_buf(),
        source: e,
    };

    tokio::fs::rename(partial, destination)
        .await
        .map_err(finalize_failed)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(destination, std::fs::Permissions::from_mode(0o644))
            .await
            .map_err(finalize_failed)?;
    }

    Ok(())
}

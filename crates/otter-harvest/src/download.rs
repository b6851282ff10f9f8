//! Streaming asset downloader.
//!
//! Each asset is streamed chunk by chunk into `<name>.part` and renamed into
//! place once flushed, so any file at a final path is complete. An existing
//! final file makes the download a no-op.

use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Suffix of in-flight downloads.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Errors for a single asset download.
#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What a successful download call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The asset was fetched and written.
    Written { bytes: u64 },
    /// A file already existed at the destination.
    Skipped,
}

/// Filename of the `index`-th asset of a run started at `timestamp_ms`.
pub fn asset_filename(prefix: &str, timestamp_ms: i64, index: usize) -> String {
    format!("{prefix}-{timestamp_ms}-{index}.jpg")
}

/// Recover `(timestamp_ms, index)` from a name built by [`asset_filename`].
///
/// The prefix may itself contain dashes; only the last two dash-separated
/// fields before the extension are read.
pub fn parse_asset_filename(name: &str) -> Option<(i64, usize)> {
    let (stem, _ext) = name.rsplit_once('.')?;
    let (rest, index) = stem.rsplit_once('-')?;
    let (_prefix, timestamp) = rest.rsplit_once('-')?;
    Some((timestamp.parse().ok()?, index.parse().ok()?))
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

/// Downloads assets into a fixed output directory.
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    output_dir: PathBuf,
}

impl Downloader {
    /// Create a downloader presenting `user_agent`, with a per-request timeout.
    pub fn new(output_dir: impl Into<PathBuf>, user_agent: &str, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(user_agent)
            .build()
            .unwrap_or_default();

        Self {
            client,
            output_dir: output_dir.into(),
        }
    }

    /// Fetch `url` into `<output_dir>/<filename>` unless that file exists.
    pub async fn download(
        &self,
        url: &str,
        filename: &str,
    ) -> Result<DownloadOutcome, DownloadError> {
        let dest = self.output_dir.join(filename);
        if tokio::fs::try_exists(&dest)
            .await
            .map_err(|e| DownloadError::io(&dest, e))?
        {
            tracing::info!("skipping download, {filename} already exists");
            return Ok(DownloadOutcome::Skipped);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| DownloadError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let part = partial_path(&dest);
        let written = match stream_to_file(url, response, &part).await {
            Ok(bytes) => tokio::fs::rename(&part, &dest)
                .await
                .map(|_| bytes)
                .map_err(|e| DownloadError::io(&dest, e)),
            Err(e) => Err(e),
        };

        match written {
            Ok(bytes) => {
                tracing::debug!("wrote {bytes} bytes to {}", dest.display());
                Ok(DownloadOutcome::Written { bytes })
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}

async fn stream_to_file(
    url: &str,
    response: reqwest::Response,
    path: &Path,
) -> Result<u64, DownloadError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    let mut bytes = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })?;
        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        bytes += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| DownloadError::io(path, e))?;
    file.sync_all().await.map_err(|e| DownloadError::io(path, e))?;
    Ok(bytes)
}

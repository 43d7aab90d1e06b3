//! Streamed HTTP downloads with byte-level progress.
//!
//! - [`meter`] - Percentage, speed and ETA computation

pub mod meter;

use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::config::DownloadConfig;
use crate::error::{Error, Result, StorageError, TransferError};
use crate::sanitize::{sanitize, url_file_name};

pub use meter::{NoProgress, ProgressCallback, ProgressMeter, ProgressUpdate};

/// Streams a URL to a file in fixed-size chunks.
///
/// The body is never buffered whole; each chunk is written as it arrives. No
/// timeout is applied, so a stalled server keeps the transfer waiting until it
/// is cancelled.
#[derive(Clone)]
pub struct HttpTransfer {
    client: reqwest::Client,
    chunk_size: usize,
}

impl HttpTransfer {
    /// Create a transfer using an existing client
    pub fn new(client: reqwest::Client, chunk_size: usize) -> Self {
        Self {
            client,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Build the HTTP client from download settings
    pub fn from_config(config: &DownloadConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| Error::Transfer(TransferError::Request(e)))?;
        Ok(Self::new(client, config.chunk_size))
    }

    /// File the URL will be written to inside `destination_dir`.
    ///
    /// The name is the URL's last path segment (query and fragment ignored),
    /// sanitized.
    pub fn target_path(url: &str, destination_dir: &Path) -> Result<PathBuf> {
        let parsed = url::Url::parse(url).map_err(|e| TransferError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let raw = url_file_name(&parsed).unwrap_or_default();
        let name = sanitize(raw);
        if !is_usable_file_name(&name) {
            return Err(StorageError::InvalidFileName {
                name: raw.to_string(),
            }
            .into());
        }
        Ok(destination_dir.join(name))
    }

    /// Download `url` into `destination_dir`, returning the written file.
    ///
    /// `progress` is invoked after every chunk while the content length is
    /// known. `cancel` is checked between chunks. A partially written file is
    /// left on disk when the transfer fails.
    pub async fn download(
        &self,
        url: &str,
        destination_dir: &Path,
        progress: &dyn ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let path = Self::target_path(url, destination_dir)?;

        tokio::fs::create_dir_all(destination_dir)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: destination_dir.to_path_buf(),
                source,
            })?;

        tracing::debug!(url = %url, path = %path.display(), "Opening download stream");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled.into()),
            response = self.client.get(url).send() => response.map_err(TransferError::Request)?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let mut meter = ProgressMeter::new(response.content_length());
        let write_err = |source| StorageError::Write {
            path: path.clone(),
            source,
        };

        let mut file = tokio::fs::File::create(&path).await.map_err(write_err)?;
        let mut stream = response.bytes_stream();
        let started = Instant::now();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled.into()),
                next = stream.next() => next,
            };
            let Some(bytes) = next else {
                break;
            };
            let bytes = bytes.map_err(TransferError::Request)?;

            for chunk in bytes.chunks(self.chunk_size) {
                if cancel.is_cancelled() {
                    return Err(TransferError::Cancelled.into());
                }
                file.write_all(chunk).await.map_err(write_err)?;

                if let Some(update) = meter.record(chunk.len() as u64, started.elapsed()) {
                    progress.on_progress(
                        update.percentage,
                        &update.speed_label,
                        update.eta_label.as_deref(),
                    );
                }
            }
        }

        file.flush().await.map_err(write_err)?;
        drop(file);

        if let Some(expected) = meter.total()
            && meter.bytes_written() != expected
        {
            return Err(TransferError::Incomplete {
                expected,
                received: meter.bytes_written(),
            }
            .into());
        }

        tracing::debug!(
            url = %url,
            bytes = meter.bytes_written(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Download stream finished"
        );

        Ok(path)
    }
}

/// Rejects names that would resolve to the directory itself or its parent.
fn is_usable_file_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().all(|c| c == '.')
}

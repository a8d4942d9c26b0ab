//! Artifact download with streaming SHA-256
//!
//! The digest is computed while bytes stream to disk, so verification after
//! a fetch costs nothing extra. Transport failures, timeouts, and oversized
//! artifacts all discard the partial file; nothing is retried silently.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, Url};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::types::Sha256Digest;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download timed out after {0:?}")]
    Timeout(Duration),

    #[error("artifact exceeds size limit: {actual} > {limit} bytes")]
    SizeLimit { limit: u64, actual: u64 },

    #[error("unsupported url scheme '{0}' (allowed: https, http, file)")]
    Scheme(String),
}

/// Caller-supplied transport limits.
#[derive(Debug, Clone)]
pub struct DownloadLimits {
    /// Hard cap on artifact size, enforced against both the advertised
    /// Content-Length and the actual streamed byte count.
    pub max_bytes: u64,
    /// Per-request timeout. On expiry the partial artifact is discarded.
    pub timeout: Duration,
}

impl Default for DownloadLimits {
    fn default() -> Self {
        Self {
            max_bytes: 4 * 1024 * 1024 * 1024,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Fetch `url` to `dest`, returning the streamed SHA-256 digest.
///
/// `file://` URLs are served from the local filesystem, which keeps install
/// flows testable without a network.
pub async fn fetch(
    client: &Client,
    url: &Url,
    dest: &Path,
    limits: &DownloadLimits,
) -> Result<Sha256Digest, DownloadError> {
    match url.scheme() {
        "https" | "http" => fetch_http(client, url, dest, limits).await,
        "file" => fetch_file(url, dest, limits),
        other => Err(DownloadError::Scheme(other.to_string())),
    }
}

async fn fetch_http(
    client: &Client,
    url: &Url,
    dest: &Path,
    limits: &DownloadLimits,
) -> Result<Sha256Digest, DownloadError> {
    let result = fetch_http_inner(client, url, dest, limits).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(dest).await;
    }
    result
}

async fn fetch_http_inner(
    client: &Client,
    url: &Url,
    dest: &Path,
    limits: &DownloadLimits,
) -> Result<Sha256Digest, DownloadError> {
    let response = client
        .get(url.clone())
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .timeout(limits.timeout)
        .send()
        .await
        .map_err(|e| map_timeout(e, limits))?
        .error_for_status()?;

    if let Some(advertised) = response.content_length() {
        if advertised > limits.max_bytes {
            return Err(DownloadError::SizeLimit {
                limit: limits.max_bytes,
                actual: advertised,
            });
        }
    }

    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| map_timeout(e, limits))?;
        downloaded += chunk.len() as u64;
        // A redirect chain or lying server can exceed the advertised length.
        if downloaded > limits.max_bytes {
            return Err(DownloadError::SizeLimit {
                limit: limits.max_bytes,
                actual: downloaded,
            });
        }
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
    }

    file.flush().await?;
    tracing::debug!(url = %url, bytes = downloaded, "artifact fetched");

    Ok(Sha256Digest::from_bytes(&hasher.finalize()))
}

fn map_timeout(e: reqwest::Error, limits: &DownloadLimits) -> DownloadError {
    if e.is_timeout() {
        DownloadError::Timeout(limits.timeout)
    } else {
        DownloadError::Http(e)
    }
}

fn fetch_file(url: &Url, dest: &Path, limits: &DownloadLimits) -> Result<Sha256Digest, DownloadError> {
    let src = url
        .to_file_path()
        .map_err(|()| DownloadError::Scheme(format!("unusable file url: {url}")))?;

    let len = std::fs::metadata(&src)?.len();
    if len > limits.max_bytes {
        return Err(DownloadError::SizeLimit {
            limit: limits.max_bytes,
            actual: len,
        });
    }

    std::fs::copy(&src, dest)?;
    Ok(crate::core::verify::hash_file(dest)?)
}

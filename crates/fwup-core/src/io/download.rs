//! Download module with streaming SHA256 verification.
//!
//! The archive is streamed to disk in fixed-size chunks while a rolling
//! hasher is updated, so peak memory is bounded by [`CHUNK_SIZE`] no matter
//! how large the package is. The digest is never derived by re-reading the
//! written file.

use std::path::{Path, PathBuf};

use fwup_schema::{RevisionId, Sha256Digest};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

use crate::Reporter;
use crate::io::fetch::{FetchError, Fetcher};

/// Bytes read from the network per step. Independent of the archive size.
pub const CHUNK_SIZE: usize = 2048;

/// Errors raised while downloading or verifying a package.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The request did not complete.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The host answered with a non-success status.
    #[error("GET {url} returned status {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Reading the body or writing the file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes do not match the expected digest.
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Expected digest.
        expected: String,
        /// Digest of the received bytes.
        actual: String,
    },
}

/// Request for a download operation
#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    /// Package URL.
    pub url: &'a str,
    /// File to write.
    pub dest: &'a Path,
    /// Digest the bytes must hash to.
    pub expected_hash: &'a Sha256Digest,
    /// Advertised size, used for progress only.
    pub expected_size: Option<u64>,
    /// Revision being downloaded, for progress.
    pub revision: &'a RevisionId,
}

/// A downloaded archive whose bytes matched the expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArchive {
    /// Where the archive was written.
    pub path: PathBuf,
    /// Its digest.
    pub sha256: Sha256Digest,
    /// Its size in bytes.
    pub size: u64,
}

/// Stream `req.url` into `req.dest`, returning the digest and byte count of
/// what was written.
///
/// On any error the partially written file is removed.
pub async fn download_to(
    fetcher: &dyn Fetcher,
    req: DownloadRequest<'_>,
    reporter: &dyn Reporter,
) -> Result<(Sha256Digest, u64), DownloadError> {
    let result = stream_to_file(fetcher, req, reporter).await;
    if result.is_err() {
        tokio::fs::remove_file(req.dest).await.ok();
    }
    result
}

async fn stream_to_file(
    fetcher: &dyn Fetcher,
    req: DownloadRequest<'_>,
    reporter: &dyn Reporter,
) -> Result<(Sha256Digest, u64), DownloadError> {
    let response = fetcher.fetch(req.url).await?;
    if !response.is_success() {
        return Err(DownloadError::Status {
            url: req.url.to_string(),
            status: response.status,
        });
    }

    if let Some(parent) = req.dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = File::create(req.dest).await?;
    let mut reader = StreamReader::new(response.body);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut downloaded: u64 = 0;

    reporter.downloading(req.revision, 0, req.expected_size);
    loop {
        let count = reader.read(&mut buffer).await?;
        if count == 0 {
            break;
        }
        let chunk = &buffer[..count];
        hasher.update(chunk);
        file.write_all(chunk).await?;
        downloaded += count as u64;
        reporter.downloading(req.revision, downloaded, req.expected_size);
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok((Sha256Digest::from_hasher(hasher), downloaded))
}

/// Compare a freshly computed digest against the expected one.
///
/// A mismatch deletes `path`, so no corrupt file can shadow a later download.
pub async fn verify(
    path: &Path,
    expected: &Sha256Digest,
    actual: &Sha256Digest,
) -> Result<(), DownloadError> {
    if actual == expected {
        return Ok(());
    }
    tracing::error!(
        path = %path.display(),
        %expected,
        %actual,
        "downloaded archive failed hash verification"
    );
    tokio::fs::remove_file(path).await.ok();
    Err(DownloadError::HashMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

/// Download `req.url` and verify it against `req.expected_hash`.
pub async fn download_and_verify(
    fetcher: &dyn Fetcher,
    req: DownloadRequest<'_>,
    reporter: &dyn Reporter,
) -> Result<VerifiedArchive, DownloadError> {
    let (actual, size) = download_to(fetcher, req, reporter).await?;
    tracing::debug!(url = req.url, size, sha256 = %actual, "download finished");
    verify(req.dest, req.expected_hash, &actual).await?;

    Ok(VerifiedArchive {
        path: req.dest.to_path_buf(),
        sha256: actual,
        size,
    })
}

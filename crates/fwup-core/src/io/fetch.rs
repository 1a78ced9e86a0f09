//! The `fetch(url) -> (status, byte-stream)` capability.
//!
//! The updater never talks to an HTTP client directly; it goes through
//! [`Fetcher`] so the transport can be swapped (HTTP, local files, tests).

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use thiserror::Error;
use tokio_util::io::ReaderStream;

use crate::io::download::CHUNK_SIZE;

/// A response body, yielded incrementally.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Errors raised before a response is available.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A local file could not be opened.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No fetcher handles the URL's scheme.
    #[error("unsupported URL: {0}")]
    UnsupportedUrl(String),
}

/// Status plus a streaming body.
pub struct FetchResponse {
    /// HTTP-equivalent status code.
    pub status: u16,
    /// The body. Dropping it closes the connection.
    pub body: ByteStream,
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl FetchResponse {
    /// Wrap a complete in-memory body.
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            body: Box::pin(futures::stream::once(async move {
                Ok::<_, std::io::Error>(body)
            })),
        }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Collect the body, refusing more than `limit` bytes.
    ///
    /// Used for manifests, which are small; packages are always streamed.
    pub async fn collect(self, limit: usize) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if out.len() + chunk.len() > limit {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("response body exceeds {limit} bytes"),
                ));
            }
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

/// Issues GET requests against the static host.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue a GET for `url`. Non-success statuses are returned, not raised.
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for std::sync::Arc<T> {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        (**self).fetch(url).await
    }
}

/// `http://` / `https://` via reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Use an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// A client with a connect timeout suitable for a flaky radio link.
    pub fn with_timeout(connect_timeout: std::time::Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(FetchResponse {
            status,
            body: Box::pin(body),
        })
    }
}

/// `file://` URLs, for hosts mounted locally and for tests.
///
/// A missing file is reported as status 404, like a static file server would.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl FileFetcher {
    fn path_of(url: &str) -> Result<PathBuf, FetchError> {
        url.strip_prefix("file://")
            .map(PathBuf::from)
            .ok_or_else(|| FetchError::UnsupportedUrl(url.to_string()))
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let path = Self::path_of(url)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => {
                if file.metadata().await?.is_dir() {
                    return Ok(FetchResponse::from_bytes(404, Bytes::new()));
                }
                Ok(FetchResponse {
                    status: 200,
                    body: Box::pin(ReaderStream::with_capacity(file, CHUNK_SIZE)),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(FetchResponse::from_bytes(404, Bytes::new()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Routes each URL to the HTTP or file fetcher by scheme.
#[derive(Debug, Clone)]
pub struct SchemeFetcher {
    http: HttpFetcher,
}

impl SchemeFetcher {
    /// Serve `http(s)://` through `http` and `file://` locally.
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Fetcher for SchemeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        if url.starts_with("file://") {
            FileFetcher.fetch(url).await
        } else if url.starts_with("http://") || url.starts_with("https://") {
            self.http.fetch(url).await
        } else {
            Err(FetchError::UnsupportedUrl(url.to_string()))
        }
    }
}

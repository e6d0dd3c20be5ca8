//! [`Fetcher`] over plain HTTP/1.1.
//!
//! One TCP connection per attempt: write a `GET` with `Connection: close`,
//! read to EOF, parse. The `ETag` header becomes the identity token.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

use super::{FetchError, FetchedText, Fetcher};
use crate::http::{Request, Response};

/// Maximum size of a complete response we will buffer (8 MiB).
const MAX_RESPONSE_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per exchange.
const INITIAL_BUF_SIZE: usize = 4096;

/// Default bound on one request/response exchange.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches resources from a single HTTP origin.
///
/// Resource identifiers are request targets (`/src/view/todo.jsx?v=1`)
/// resolved against `authority` (`host:port`).
///
/// # Examples
///
/// ```rust,no_run
/// use routeload::fetch::{Fetcher, HttpFetcher};
///
/// # async fn example() -> Result<(), routeload::fetch::FetchError> {
/// let fetcher = HttpFetcher::new("127.0.0.1:8080");
/// let view = fetcher.fetch("/src/view/todo.jsx").await?;
/// println!("{} bytes, etag {:?}", view.text.len(), view.etag);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    authority: Arc<str>,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(authority: impl AsRef<str>) -> Self {
        Self {
            authority: Arc::from(authority.as_ref()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bounds each exchange (connect, write, read) by `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, resource: &str) -> BoxFuture<'static, Result<FetchedText, FetchError>> {
        Box::pin(get(
            Arc::clone(&self.authority),
            resource.to_owned(),
            self.timeout,
        ))
    }
}

async fn get(
    authority: Arc<str>,
    resource: String,
    timeout: Duration,
) -> Result<FetchedText, FetchError> {
    let transport = |source: io::Error| FetchError::Transport {
        resource: resource.clone(),
        source: Arc::new(source),
    };

    let buf = match tokio::time::timeout(timeout, exchange(&authority, &resource)).await {
        Ok(result) => result.map_err(transport)?,
        Err(_) => {
            return Err(transport(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no response within {timeout:?}"),
            )));
        }
    };

    let response = Response::parse(&buf).map_err(|e| FetchError::InvalidResponse {
        resource: resource.clone(),
        reason: e.to_string(),
    })?;

    let status = response.status();
    trace!(resource = %resource, status = %status, bytes = buf.len(), "response received");
    if !status.is_success() {
        return Err(FetchError::Status { resource, status });
    }

    let etag = response.headers().etag().unwrap_or_default().to_owned();
    let text = String::from_utf8(response.into_body().to_vec()).map_err(|_| {
        FetchError::InvalidResponse {
            resource: resource.clone(),
            reason: "body is not valid UTF-8".to_owned(),
        }
    })?;

    Ok(FetchedText { text, etag })
}

async fn exchange(authority: &str, resource: &str) -> io::Result<BytesMut> {
    let mut stream = TcpStream::connect(authority).await?;

    let request = Request::get(authority, resource)
        .header("Accept", "*/*")
        .header("Cache-Control", "no-store");
    stream.write_all(&request.into_bytes()).await?;
    stream.flush().await?;

    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
    while stream.read_buf(&mut buf).await? > 0 {
        if buf.len() > MAX_RESPONSE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "response exceeds maximum size",
            ));
        }
    }
    Ok(buf)
}

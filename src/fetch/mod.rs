//! Resilient text retrieval with bounded retry and cooperative cancellation.
//!
//! A [`Fetcher`] turns a resource identifier into text plus an identity token
//! (the resource's ETag). [`fetch_text`] wraps any fetcher with the retry
//! policy the loader uses: a fixed number of attempts, a linearly growing
//! pause between them, and immediate abort when the caller's
//! [`CancellationToken`] fires.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::http::StatusCode;

pub mod http;

pub use self::http::HttpFetcher;

/// A fetched text resource and its content-identity token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedText {
    pub text: String,
    /// Opaque fingerprint of `text`; empty when the server sent none.
    pub etag: String,
}

impl FetchedText {
    pub fn new(text: impl Into<String>, etag: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            etag: etag.into(),
        }
    }
}

/// Errors produced while fetching a resource.
///
/// `Clone` so that one failed shared load can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("failed to fetch {resource}: {source}")]
    Transport {
        resource: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("{resource} answered {status}")]
    Status { resource: String, status: StatusCode },

    #[error("invalid response for {resource}: {reason}")]
    InvalidResponse { resource: String, reason: String },

    #[error("fetch of {resource} was cancelled")]
    Cancelled { resource: String },
}

impl FetchError {
    /// The resource identifier the failure relates to.
    pub fn resource(&self) -> &str {
        match self {
            Self::Transport { resource, .. }
            | Self::Status { resource, .. }
            | Self::InvalidResponse { resource, .. }
            | Self::Cancelled { resource } => resource,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Retrieves a text resource by identifier.
///
/// Implemented for [`HttpFetcher`] and for any
/// `Fn(String) -> impl Future<Output = Result<FetchedText, FetchError>>`,
/// which is how tests and embedders supply in-memory resources.
pub trait Fetcher: Send + Sync + 'static {
    /// Performs a single retrieval attempt.
    fn fetch(&self, resource: &str) -> BoxFuture<'static, Result<FetchedText, FetchError>>;
}

impl<T, F> Fetcher for T
where
    T: Fn(String) -> F + Send + Sync + 'static,
    F: Future<Output = Result<FetchedText, FetchError>> + Send + 'static,
{
    fn fetch(&self, resource: &str) -> BoxFuture<'static, Result<FetchedText, FetchError>> {
        Box::pin((self)(resource.to_owned()))
    }
}

/// How many times to try a fetch, and how long to pause between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub attempts: u32,
    /// Pause after the first failure; later pauses grow linearly.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// A policy with `attempts` tries and the default base delay.
    pub fn attempts(attempts: u32) -> Self {
        Self {
            attempts,
            ..Self::default()
        }
    }

    /// A single attempt; failure is final.
    pub fn once() -> Self {
        Self::attempts(1)
    }

    /// Delay after the failure of attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }
}

/// Fetches `resource`, retrying per `policy`.
///
/// The last attempt's failure is returned as-is. When `cancel` fires during
/// an attempt or a backoff pause, the call fails with
/// [`FetchError::Cancelled`] without further attempts.
///
/// # Examples
///
/// ```
/// use routeload::fetch::{fetch_text, FetchedText, FetchError, RetryPolicy};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let fetcher = |resource: String| async move {
///     Ok::<_, FetchError>(FetchedText::new(format!("contents of {resource}"), "\"v1\""))
/// };
/// let fetched = fetch_text(&fetcher, "/src/view/todo.jsx", RetryPolicy::default(), &CancellationToken::new())
///     .await
///     .unwrap();
/// assert_eq!(fetched.etag, "\"v1\"");
/// # }
/// ```
pub async fn fetch_text(
    fetcher: &dyn Fetcher,
    resource: &str,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<FetchedText, FetchError> {
    let attempts = policy.attempts.max(1);
    let cancelled = || FetchError::Cancelled {
        resource: resource.to_owned(),
    };

    let mut attempt = 0;
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            result = fetcher.fetch(resource) => result,
        };

        let error = match result {
            Ok(fetched) => return Ok(fetched),
            Err(e) => e,
        };

        if error.is_cancelled() || attempt + 1 >= attempts {
            debug!(resource, attempts = attempt + 1, error = %error, "fetch failed");
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            resource,
            attempt = attempt + 1,
            retry_in = ?delay,
            error = %error,
            "fetch attempt failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

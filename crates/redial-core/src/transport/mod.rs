//! Transport seam: the capability the dispatcher depends on.
//!
//! An adapter issues one submission per [`TransportCall`], reports zero or
//! more progress fractions through the [`ProgressSink`], and returns
//! exactly one terminal outcome. Wire-level concerns (connection pooling,
//! TLS, multipart encoding) live entirely behind this trait.

#[cfg(feature = "reqwest-transport")]
mod reqwest;

#[cfg(feature = "reqwest-transport")]
pub use self::reqwest::ReqwestTransport;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::TransportError;
use crate::request::{Method, RequestData, SessionKind, TaskKind};

/// Everything an adapter needs to issue one submission.
#[derive(Debug, Clone)]
pub struct TransportCall {
    pub url: Url,
    pub method: Method,
    pub params: RequestData,
    pub task: TaskKind,
    pub session: SessionKind,
    /// Fixed per-call timeout, independent of any retry delay.
    pub timeout: Duration,
}

/// Response delivered by an adapter: status line plus the full body.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Failed submission: the error, plus the response when one was received
/// at all (e.g. a non-2xx status with a body).
#[derive(Debug)]
pub struct TransportFailure {
    pub response: Option<Response>,
    pub error: TransportError,
}

impl TransportFailure {
    pub fn from_error(error: TransportError) -> Self {
        Self {
            response: None,
            error,
        }
    }
}

pub type TransportResult = Result<Response, TransportFailure>;

/// Progress reporting channel handed to adapters. Fractions are clamped
/// to [0, 1]; reports after the terminal outcome are dropped by the
/// dispatcher.
#[derive(Clone)]
pub struct ProgressSink {
    inner: Arc<dyn Fn(f32) + Send + Sync>,
}

impl ProgressSink {
    pub fn new(report: impl Fn(f32) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(report),
        }
    }

    /// Sink that discards all reports.
    pub fn disabled() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, fraction: f32) {
        (self.inner)(fraction.clamp(0.0, 1.0));
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProgressSink")
    }
}

/// HTTP transport capability consumed by the dispatcher.
///
/// Cancellation is task abort: the dispatcher drops the future driving
/// `perform`, so adapters must tolerate being dropped at any await point.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Issues one submission and resolves with its terminal outcome.
    async fn perform(&self, call: TransportCall, progress: ProgressSink) -> TransportResult;

    /// Streams `url` to `destination` on disk, resolving with the final
    /// path. One-shot; never retried by the dispatcher.
    async fn download(
        &self,
        url: Url,
        destination: PathBuf,
        progress: ProgressSink,
    ) -> Result<PathBuf, TransportFailure>;
}

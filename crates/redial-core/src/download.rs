//! One-shot downloads: stream a URL to disk with progress reporting.
//!
//! Downloads are not requests: they never enter the dispatch table and
//! are never retried automatically. Cancellation aborts the transfer
//! through the returned handle.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use url::Url;

use crate::error::DispatchError;
use crate::transport::{ProgressSink, Transport, TransportFailure};

pub type DownloadSuccessHandler = Box<dyn FnOnce(PathBuf) + Send>;
pub type DownloadFailureHandler = Box<dyn FnOnce(DispatchError) + Send>;

/// Description of a one-shot download, configured fluently like a
/// [`Request`](crate::request::Request).
pub struct DownloadTask {
    pub(crate) url: Url,
    pub(crate) destination: PathBuf,
    pub(crate) file_name: String,
    pub(crate) progress_handler: Option<Arc<dyn Fn(f32) + Send + Sync>>,
    pub(crate) success_handler: Option<DownloadSuccessHandler>,
    pub(crate) failure_handler: Option<DownloadFailureHandler>,
}

impl DownloadTask {
    /// Download `url` into `destination`/`file_name`.
    pub fn new(url: Url, destination: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            url,
            destination: destination.into(),
            file_name: file_name.into(),
            progress_handler: None,
            success_handler: None,
            failure_handler: None,
        }
    }

    pub fn progress(mut self, handler: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.progress_handler = Some(Arc::new(handler));
        self
    }

    /// Invoked with the final on-disk location.
    pub fn success(mut self, handler: impl FnOnce(PathBuf) + Send + 'static) -> Self {
        self.success_handler = Some(Box::new(handler));
        self
    }

    pub fn failure(mut self, handler: impl FnOnce(DispatchError) + Send + 'static) -> Self {
        self.failure_handler = Some(Box::new(handler));
        self
    }
}

/// Handle to an in-flight download.
pub struct DownloadHandle {
    task: JoinHandle<()>,
}

impl DownloadHandle {
    /// Aborts the transfer. No handler is invoked for a cancelled
    /// download; a partial file may remain at the destination.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the download to finish (handlers included).
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

pub(crate) fn spawn(transport: Arc<dyn Transport>, task: DownloadTask) -> DownloadHandle {
    let DownloadTask {
        url,
        destination,
        file_name,
        progress_handler,
        success_handler,
        failure_handler,
    } = task;

    let dest_path = destination.join(&file_name);
    let sink = match progress_handler {
        Some(report) => ProgressSink::new(move |fraction| report(fraction)),
        None => ProgressSink::disabled(),
    };

    let join = tokio::spawn(async move {
        match transport.download(url, dest_path, sink).await {
            Ok(path) => {
                tracing::debug!(path = %path.display(), "download finished");
                if let Some(success) = success_handler {
                    success(path);
                }
            }
            Err(TransportFailure { response, error }) => {
                let status = response.as_ref().map(|r| r.status);
                let error = DispatchError::Transport { status, error };
                tracing::warn!(error = %error, "download failed");
                if let Some(failure) = failure_handler {
                    failure(error);
                }
            }
        }
    });

    DownloadHandle { task: join }
}

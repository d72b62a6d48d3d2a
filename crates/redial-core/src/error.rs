//! Error taxonomy for dispatch and transport failures.
//!
//! `TransportError` is what an adapter reports for one submission;
//! `DispatchError` is what callers see in failure handlers. Keeping them
//! separate lets the retry policy classify transport failures without
//! caring which adapter produced them.

use thiserror::Error;

/// Failure reported by a transport adapter for a single submission.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The per-call timeout elapsed (connect or read).
    #[error("operation timed out")]
    Timeout,
    /// Network-level failure (connection refused/reset, DNS, TLS, etc.).
    #[error("connection failed: {0}")]
    Connection(String),
    /// The server answered with a non-success HTTP status.
    #[error("HTTP status {0}")]
    Status(u16),
    /// Local I/O failed (e.g. reading an upload file, writing a download).
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Anything else the adapter could not map more precisely.
    #[error("{0}")]
    Other(String),
}

/// Error delivered to a request's failure handler.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The transport attempted the request and it failed.
    #[error("transport failure: {error}")]
    Transport {
        /// HTTP status, when a response was received at all.
        status: Option<u16>,
        #[source]
        error: TransportError,
    },
    /// No network attempt was made: reachability was down and the request's
    /// policy asked to fail fast.
    #[error("network not reachable")]
    NotReachable,
    /// The request was cancelled or the dispatcher was invalidated. Never
    /// retried.
    #[error("request cancelled")]
    Cancelled,
    /// Caller bug (empty path, unjoinable URL, ...). Never retried.
    #[error("invalid request: {0}")]
    Configuration(String),
}

impl DispatchError {
    /// HTTP status code carried by the underlying failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled)
    }
}

//! Request value object: target, method, parameters, retry policy, task
//! kind, and registered outcome handlers. Pure data plus identity; all
//! network behavior lives in the dispatcher.

mod params;

pub use params::{Param, RequestData, StreamSource, UploadItem, UploadReader};

use std::fmt;

use crate::error::DispatchError;
use crate::retry::RetryPolicy;
use crate::transport::Response;

/// Opaque per-submission identity, used as the dispatcher table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        }
    }
}

/// Lifecycle status of a request. Per attempt the transitions are
/// Waiting -> Running -> {Success, Failure}, with Running -> PendingRetry
/// -> Running for the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Waiting,
    Running,
    PendingRetry,
    Success,
    Failure,
}

/// Which transport session a request targets. Background sessions continue
/// transfers while the hosting process is suspended; only plain data tasks
/// support them (background uploads are downgraded to Default with a
/// warning).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionKind {
    #[default]
    Default,
    Background,
}

/// Kind of work a request represents.
#[derive(Debug, Clone, Default)]
pub enum TaskKind {
    /// Plain request/response exchange.
    #[default]
    Data,
    /// Multipart upload; item order is preserved through the adapter.
    Upload(Vec<UploadItem>),
}

pub type ProgressHandler = Box<dyn FnMut(f32) + Send>;
pub type SuccessHandler = Box<dyn FnOnce(Response) + Send>;
pub type FailureHandler = Box<dyn FnOnce(Option<Response>, DispatchError) + Send>;
pub type CompletionHandler = Box<dyn FnOnce() + Send>;

/// One unit of work for the dispatcher.
///
/// Built by the caller, configured fluently, then moved into
/// [`Dispatcher::dispatch`](crate::dispatcher::Dispatcher::dispatch). The
/// runtime fields (`status`, `retry_count`) are mutated only by the
/// dispatcher actor; query them afterwards via `Dispatcher::status`.
pub struct Request {
    pub(crate) path: String,
    pub(crate) method: Method,
    pub(crate) data: RequestData,
    pub(crate) task_kind: TaskKind,
    pub(crate) session_kind: SessionKind,
    pub(crate) retry: RetryPolicy,

    pub(crate) status: Status,
    pub(crate) retry_count: u32,

    pub(crate) progress_handler: Option<ProgressHandler>,
    pub(crate) success_handler: Option<SuccessHandler>,
    pub(crate) failure_handler: Option<FailureHandler>,
    pub(crate) completion_handler: Option<CompletionHandler>,
}

impl Request {
    pub fn new(
        path: impl Into<String>,
        data: RequestData,
        method: Method,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            path: path.into(),
            method,
            data,
            task_kind: TaskKind::Data,
            session_kind: SessionKind::Default,
            retry,
            status: Status::Waiting,
            retry_count: 0,
            progress_handler: None,
            success_handler: None,
            failure_handler: None,
            completion_handler: None,
        }
    }

    /// GET request with no parameters and the default retry policy.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(path, RequestData::new(), Method::Get, RetryPolicy::default())
    }

    /// POST request with the default retry policy.
    pub fn post(path: impl Into<String>, data: RequestData) -> Self {
        Self::new(path, data, Method::Post, RetryPolicy::default())
    }

    /// Turns the request into a multipart upload carrying `items` in order.
    pub fn upload(mut self, items: Vec<UploadItem>) -> Self {
        self.task_kind = TaskKind::Upload(items);
        self
    }

    pub fn session(mut self, kind: SessionKind) -> Self {
        self.session_kind = kind;
        self
    }

    /// Registers the progress handler (fraction complete in [0, 1]).
    pub fn progress(mut self, handler: impl FnMut(f32) + Send + 'static) -> Self {
        self.progress_handler = Some(Box::new(handler));
        self
    }

    /// Registers the success handler, invoked once with the response on a
    /// terminal success.
    pub fn success(mut self, handler: impl FnOnce(Response) + Send + 'static) -> Self {
        self.success_handler = Some(Box::new(handler));
        self
    }

    /// Registers the failure handler, invoked once with the response (if
    /// any) and the error once retries are exhausted or the failure is
    /// terminal.
    pub fn failure(
        mut self,
        handler: impl FnOnce(Option<Response>, DispatchError) + Send + 'static,
    ) -> Self {
        self.failure_handler = Some(Box::new(handler));
        self
    }

    /// Registers the completion handler, invoked exactly once per dispatch
    /// lifecycle regardless of outcome. Never invoked for intermediate
    /// retries.
    pub fn completion(mut self, handler: impl FnOnce() + Send + 'static) -> Self {
        self.completion_handler = Some(Box::new(handler));
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Completed retry attempts so far (0 before any retry).
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("session_kind", &self.session_kind)
            .field("status", &self.status)
            .field("retry_count", &self.retry_count)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of a tracked request, returned by status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestSnapshot {
    pub status: Status,
    pub retry_count: u32,
}

//! Dispatcher: the public handle over the request-dispatch state machine.
//!
//! Cloneable and cheap to share; all mutation happens on the actor task it
//! spawns at construction. See [`actor`] for the state machine itself.

mod actor;
mod entry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use actor::{Actor, Msg};

use crate::background::BackgroundHost;
use crate::config::DispatchConfig;
use crate::download::{self, DownloadHandle, DownloadTask};
use crate::error::DispatchError;
use crate::reachability::{NetworkStatus, ReachabilityMonitor};
use crate::request::{Request, RequestId, RequestSnapshot, Status};
use crate::transport::Transport;

/// Handle to a running dispatcher.
///
/// Requires a tokio runtime: construction spawns the owning actor task.
/// Dropping all clones leaves the actor idle; call [`Dispatcher::shutdown`]
/// to tear it down (outstanding requests fail with a cancellation error).
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Msg>,
    next_id: Arc<AtomicU64>,
    reach: watch::Receiver<NetworkStatus>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        monitor: &ReachabilityMonitor,
        background: Arc<dyn BackgroundHost>,
        config: DispatchConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let reach = monitor.subscribe();
        let actor = Actor::new(
            Arc::clone(&transport),
            background,
            config,
            rx,
            tx.clone(),
            reach.clone(),
        );
        tokio::spawn(actor.run());
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(0)),
            reach,
            transport,
        }
    }

    /// Submits a request and returns its identity.
    ///
    /// Outcomes are reported through the request's registered handlers. Two
    /// cases resolve synchronously, without contacting the transport: an
    /// invalid request (empty path — a caller bug, asserted in debug
    /// builds and rejected defensively in release), and a request whose
    /// policy says to fail when reachability is down while it currently is.
    pub fn dispatch(&self, mut request: Request) -> RequestId {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);

        if request.path.is_empty() {
            debug_assert!(false, "request path must not be empty");
            fail_inline(
                &mut request,
                DispatchError::Configuration("empty request path".into()),
            );
            return id;
        }

        if request.retry.fail_when_not_reachable && self.reach.borrow().is_down() {
            tracing::debug!(request = id.0, "not reachable at dispatch; failing fast");
            fail_inline(&mut request, DispatchError::NotReachable);
            return id;
        }

        if let Err(mpsc::error::SendError(msg)) = self.tx.send(Msg::Dispatch { id, request }) {
            tracing::warn!(request = id.0, "dispatcher is shut down");
            if let Msg::Dispatch { mut request, .. } = msg {
                fail_inline(&mut request, DispatchError::Cancelled);
            }
        }
        id
    }

    /// Manually retries a tracked request that is pending retry. When
    /// reachability is down the request is parked until it is restored.
    pub fn retry(&self, id: RequestId) {
        let _ = self.tx.send(Msg::Retry(id));
    }

    /// Cancels one tracked request: aborts its in-flight submission or
    /// pending retry timer and fails it with a cancellation error. A
    /// cancelled request never retries afterward.
    pub fn cancel(&self, id: RequestId) {
        let _ = self.tx.send(Msg::Cancel(id));
    }

    /// Tears down all tracked work (e.g. on session teardown). Every
    /// tracked request fails with a cancellation error and no retry timer
    /// fires afterward.
    pub fn invalidate_all(&self) {
        let _ = self.tx.send(Msg::InvalidateAll);
    }

    /// Invalidates all tracked work and stops the actor.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Msg::Shutdown);
    }

    /// Snapshot of a tracked request's status and retry count. `None` once
    /// the request reached a terminal state (or was never dispatched).
    pub async fn status(&self, id: RequestId) -> Option<RequestSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Msg::Status { id, reply }).ok()?;
        rx.await.ok().flatten()
    }

    /// Starts a one-shot download. Downloads live outside the retry state
    /// machine: no automatic retry, cancellation via the returned handle.
    pub fn download(&self, task: DownloadTask) -> DownloadHandle {
        download::spawn(Arc::clone(&self.transport), task)
    }

    /// Last reachability status observed from the monitor.
    pub fn network_status(&self) -> NetworkStatus {
        *self.reach.borrow()
    }
}

/// Terminal failure delivered before the request ever reached the actor.
fn fail_inline(request: &mut Request, error: DispatchError) {
    request.status = Status::Failure;
    if let Some(failure) = request.failure_handler.take() {
        failure(None, error);
    }
    if let Some(completion) = request.completion_handler.take() {
        completion();
    }
}

//! Single-owner actor: the dispatch/retry state machine.
//!
//! One tokio task owns the tracked-request table and the progress map;
//! every state transition happens inside its loop, so "outcome arrived",
//! "invalidate fired", and "reachability changed" can never race. Spawned
//! transport submissions and retry timers report back through the same
//! FIFO channel, which keeps per-request event ordering.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use super::entry::{Entry, WaitState};
use crate::background::BackgroundHost;
use crate::config::DispatchConfig;
use crate::error::{DispatchError, TransportError};
use crate::reachability::NetworkStatus;
use crate::request::{Request, RequestId, RequestSnapshot, SessionKind, Status, TaskKind};
use crate::retry::RetryDecision;
use crate::transport::{
    ProgressSink, Response, Transport, TransportCall, TransportFailure, TransportResult,
};

pub(crate) enum Msg {
    Dispatch {
        id: RequestId,
        request: Request,
    },
    Retry(RequestId),
    Cancel(RequestId),
    InvalidateAll,
    Shutdown,
    Status {
        id: RequestId,
        reply: oneshot::Sender<Option<RequestSnapshot>>,
    },
    Progress {
        op: u64,
        fraction: f32,
    },
    Outcome {
        op: u64,
        result: TransportResult,
    },
    TimerFired(RequestId),
}

pub(crate) struct Actor {
    transport: Arc<dyn Transport>,
    background: Arc<dyn BackgroundHost>,
    config: DispatchConfig,
    rx: mpsc::UnboundedReceiver<Msg>,
    tx: mpsc::UnboundedSender<Msg>,
    reach: watch::Receiver<NetworkStatus>,
    /// The running-requests set: membership means Running or PendingRetry.
    table: HashMap<RequestId, Entry>,
    /// Progress map: transport operation id -> owning request. Inserted at
    /// submission, removed on every outcome path so stale entries cannot
    /// accumulate or route callbacks to finished requests.
    ops: HashMap<u64, RequestId>,
    next_op: u64,
}

impl Actor {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        background: Arc<dyn BackgroundHost>,
        config: DispatchConfig,
        rx: mpsc::UnboundedReceiver<Msg>,
        tx: mpsc::UnboundedSender<Msg>,
        reach: watch::Receiver<NetworkStatus>,
    ) -> Self {
        Self {
            transport,
            background,
            config,
            rx,
            tx,
            reach,
            table: HashMap::new(),
            ops: HashMap::new(),
            next_op: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut reach_open = true;
        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(Msg::Shutdown) | None => break,
                    Some(msg) => self.handle(msg),
                },
                changed = self.reach.changed(), if reach_open => match changed {
                    Ok(()) => {
                        if !self.reach.borrow_and_update().is_down() {
                            self.on_reachability_restored();
                        }
                    }
                    // Monitor dropped; keep the last observed status.
                    Err(_) => reach_open = false,
                },
            }
        }
        self.invalidate_all();
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Dispatch { id, request } => {
                self.table.insert(id, Entry::new(request));
                self.submit_attempt(id);
            }
            Msg::Retry(id) => self.on_manual_retry(id),
            Msg::Cancel(id) => self.on_cancel(id),
            Msg::InvalidateAll => self.invalidate_all(),
            Msg::Status { id, reply } => {
                let snapshot = self.table.get(&id).map(|entry| RequestSnapshot {
                    status: entry.request.status,
                    retry_count: entry.request.retry_count,
                });
                let _ = reply.send(snapshot);
            }
            Msg::Progress { op, fraction } => self.on_progress(op, fraction),
            Msg::Outcome { op, result } => self.on_outcome(op, result),
            Msg::TimerFired(id) => self.on_timer_fired(id),
            // Handled in `run`.
            Msg::Shutdown => {}
        }
    }

    /// Submits one transport attempt for a tracked request. The entry is
    /// taken out of the table for the duration so terminal paths consume
    /// it and retry paths re-insert it.
    fn submit_attempt(&mut self, id: RequestId) {
        let Some(mut entry) = self.table.remove(&id) else {
            return;
        };

        // Checked per attempt, not just at first dispatch: an outage can
        // begin between retries.
        if entry.request.retry.fail_when_not_reachable && self.reach.borrow().is_down() {
            tracing::debug!(request = id.0, "reachability down, failing fast");
            self.finish_failure(id, entry, None, DispatchError::NotReachable);
            return;
        }

        let url = match self.config.base_url.join(&entry.request.path) {
            Ok(url) => url,
            Err(e) => {
                debug_assert!(false, "unjoinable request path {:?}: {e}", entry.request.path);
                let message = format!("cannot join path {:?}: {e}", entry.request.path);
                self.finish_failure(id, entry, None, DispatchError::Configuration(message));
                return;
            }
        };

        let mut session = entry.request.session_kind;
        if session == SessionKind::Background
            && matches!(entry.request.task_kind, TaskKind::Upload(_))
        {
            tracing::warn!(
                request = id.0,
                "background uploads are unsupported; using the default session"
            );
            session = SessionKind::Default;
        }
        if session == SessionKind::Background && !entry.background_work {
            self.background.begin_background_work();
            entry.background_work = true;
        }

        entry.request.status = Status::Running;

        let op = self.next_op;
        self.next_op += 1;
        self.ops.insert(op, id);

        let call = TransportCall {
            url,
            method: entry.request.method,
            params: entry.request.data.clone(),
            task: entry.request.task_kind.clone(),
            session,
            timeout: self.config.request_timeout(),
        };

        let progress_tx = self.tx.clone();
        let sink = ProgressSink::new(move |fraction| {
            let _ = progress_tx.send(Msg::Progress { op, fraction });
        });

        let transport = Arc::clone(&self.transport);
        let outcome_tx = self.tx.clone();
        let timeout = self.config.request_timeout();
        let task = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, transport.perform(call, sink)).await {
                Ok(result) => result,
                Err(_) => Err(TransportFailure::from_error(TransportError::Timeout)),
            };
            let _ = outcome_tx.send(Msg::Outcome { op, result });
        });

        entry.wait = WaitState::Transport { op, task };
        self.table.insert(id, entry);
        tracing::debug!(request = id.0, op, "submitted to transport");
    }

    fn on_outcome(&mut self, op: u64, result: TransportResult) {
        let Some(id) = self.ops.remove(&op) else {
            tracing::trace!(op, "outcome for unregistered operation dropped");
            return;
        };
        let Some(mut entry) = self.table.remove(&id) else {
            return;
        };
        // The submission resolved; nothing left to abort for this attempt.
        entry.wait = WaitState::Idle;
        match result {
            Ok(response) => self.finish_success(id, entry, response),
            Err(failure) => self.on_failure(id, entry, failure),
        }
    }

    /// Classifies a failed attempt and either surfaces it or schedules the
    /// retry. The entry is already out of the table.
    fn on_failure(&mut self, id: RequestId, mut entry: Entry, failure: TransportFailure) {
        let TransportFailure { response, error } = failure;
        let status = response.as_ref().map(|r| r.status).or(match &error {
            TransportError::Status(code) => Some(*code),
            _ => None,
        });
        let error = DispatchError::Transport { status, error };

        let attempts_made = entry.request.retry_count + 1;
        let backgrounded = self.background.is_backgrounded();
        let reachable = !self.reach.borrow().is_down();
        let decision =
            entry
                .request
                .retry
                .classify(Err(&error), attempts_made, backgrounded, reachable);
        tracing::debug!(
            request = id.0,
            attempts_made,
            ?decision,
            error = %error,
            "attempt failed"
        );

        match decision {
            // classify never maps a failure to Succeed; fall through to
            // terminal failure if it ever does.
            RetryDecision::Succeed | RetryDecision::FailTerminal => {
                self.finish_failure(id, entry, response, error);
            }
            RetryDecision::RetryNow => {
                entry.request.status = Status::PendingRetry;
                entry.request.retry_count += 1;
                self.table.insert(id, entry);
                self.submit_attempt(id);
            }
            RetryDecision::RetryAfterDelay(delay) => {
                entry.request.status = Status::PendingRetry;
                let timer_tx = self.tx.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = timer_tx.send(Msg::TimerFired(id));
                });
                entry.wait = WaitState::Timer(task);
                self.table.insert(id, entry);
            }
            RetryDecision::RetryWhenReachable => {
                // Parked; the attempt counter is consumed only when the
                // retry actually launches on restore.
                entry.request.status = Status::PendingRetry;
                entry.wait = WaitState::Reachable;
                self.table.insert(id, entry);
            }
        }
    }

    fn on_timer_fired(&mut self, id: RequestId) {
        let Some(entry) = self.table.get_mut(&id) else {
            return;
        };
        // Stale fire after a cancel or resubmission.
        if !matches!(entry.wait, WaitState::Timer(_)) {
            return;
        }
        entry.wait = WaitState::Idle;
        entry.request.retry_count += 1;
        self.submit_attempt(id);
    }

    fn on_manual_retry(&mut self, id: RequestId) {
        let down = self.reach.borrow().is_down();
        let Some(entry) = self.table.get_mut(&id) else {
            tracing::warn!(request = id.0, "manual retry for unknown request");
            return;
        };
        if matches!(entry.wait, WaitState::Transport { .. }) {
            tracing::warn!(request = id.0, "manual retry ignored: submission in flight");
            return;
        }
        entry.abort_wait();
        if down {
            entry.request.status = Status::PendingRetry;
            entry.wait = WaitState::Reachable;
            return;
        }
        entry.request.retry_count += 1;
        self.submit_attempt(id);
    }

    fn on_cancel(&mut self, id: RequestId) {
        let Some(mut entry) = self.table.remove(&id) else {
            return;
        };
        if let Some(op) = entry.abort_wait() {
            self.ops.remove(&op);
        }
        self.finish_failure(id, entry, None, DispatchError::Cancelled);
    }

    /// Tears down all tracked work: aborts in-flight submissions and
    /// pending timers, then fails every request with a cancellation error.
    fn invalidate_all(&mut self) {
        if !self.table.is_empty() {
            tracing::info!(count = self.table.len(), "invalidating all tracked requests");
        }
        let ids: Vec<RequestId> = self.table.keys().copied().collect();
        for id in ids {
            let Some(mut entry) = self.table.remove(&id) else {
                continue;
            };
            if let Some(op) = entry.abort_wait() {
                self.ops.remove(&op);
            }
            // No further retry even if dispatch is somehow re-entered.
            entry.request.retry_count = entry.request.retry.max_retry_count;
            self.finish_failure(id, entry, None, DispatchError::Cancelled);
        }
        self.ops.clear();
    }

    fn on_reachability_restored(&mut self) {
        let ids: Vec<RequestId> = self
            .table
            .iter()
            .filter(|(_, entry)| {
                entry.request.status == Status::PendingRetry && entry.waiting_on_reachability()
            })
            .map(|(id, _)| *id)
            .collect();
        if ids.is_empty() {
            return;
        }
        tracing::info!(count = ids.len(), "reachability restored; resuming parked requests");
        for id in ids {
            if let Some(entry) = self.table.get_mut(&id) {
                entry.wait = WaitState::Idle;
                entry.request.retry_count += 1;
            }
            self.submit_attempt(id);
        }
    }

    fn on_progress(&mut self, op: u64, fraction: f32) {
        let Some(id) = self.ops.get(&op) else {
            return;
        };
        if let Some(entry) = self.table.get_mut(id) {
            if let Some(handler) = entry.request.progress_handler.as_mut() {
                handler(fraction);
            }
        }
    }

    fn finish_success(&self, id: RequestId, mut entry: Entry, response: Response) {
        entry.request.status = Status::Success;
        tracing::debug!(request = id.0, status = response.status, "request succeeded");
        if let Some(success) = entry.request.success_handler.take() {
            success(response);
        }
        self.complete(&mut entry);
    }

    fn finish_failure(
        &self,
        id: RequestId,
        mut entry: Entry,
        response: Option<Response>,
        error: DispatchError,
    ) {
        entry.request.status = Status::Failure;
        tracing::debug!(request = id.0, error = %error, "request failed terminally");
        if let Some(failure) = entry.request.failure_handler.take() {
            failure(response, error);
        }
        self.complete(&mut entry);
    }

    /// Shared terminal tail: completion handler exactly once, then release
    /// any background-work window.
    fn complete(&self, entry: &mut Entry) {
        if let Some(completion) = entry.request.completion_handler.take() {
            completion();
        }
        if entry.background_work {
            entry.background_work = false;
            self.background.end_background_work();
        }
    }
}

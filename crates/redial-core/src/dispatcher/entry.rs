//! Tracked-table entry: a registered request plus whatever it is
//! currently waiting on.

use tokio::task::JoinHandle;

use crate::request::Request;

/// The cancellable thing a tracked request is waiting on. Timers and
/// transport submissions are owned tasks so invalidate/cancel can abort
/// them deterministically instead of flag-checking after the fact.
pub(crate) enum WaitState {
    /// Transiently between states.
    Idle,
    /// One outstanding transport submission.
    Transport { op: u64, task: JoinHandle<()> },
    /// A scheduled one-shot retry timer.
    Timer(JoinHandle<()>),
    /// Parked until reachability is restored.
    Reachable,
}

pub(crate) struct Entry {
    pub(crate) request: Request,
    pub(crate) wait: WaitState,
    /// Whether a background-work window was opened for this request.
    pub(crate) background_work: bool,
}

impl Entry {
    pub(crate) fn new(request: Request) -> Self {
        Self {
            request,
            wait: WaitState::Idle,
            background_work: false,
        }
    }

    /// Aborts whatever the entry waits on. Returns the transport op id to
    /// unregister from the progress map, if a submission was in flight.
    pub(crate) fn abort_wait(&mut self) -> Option<u64> {
        match std::mem::replace(&mut self.wait, WaitState::Idle) {
            WaitState::Transport { op, task } => {
                task.abort();
                Some(op)
            }
            WaitState::Timer(task) => {
                task.abort();
                None
            }
            WaitState::Idle | WaitState::Reachable => None,
        }
    }

    pub(crate) fn waiting_on_reachability(&self) -> bool {
        matches!(self.wait, WaitState::Reachable)
    }
}

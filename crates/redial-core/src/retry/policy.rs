use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::DispatchError;
use crate::transport::Response;

/// Caller-supplied predicate that force-fails on matching errors,
/// bypassing the retry-count logic entirely.
pub type FailOnError = Arc<dyn Fn(&DispatchError) -> bool + Send + Sync>;

/// Decision returned by [`RetryPolicy::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The outcome was a success; nothing to retry.
    Succeed,
    /// Retry immediately (zero break time).
    RetryNow,
    /// Retry after the given delay.
    RetryAfterDelay(Duration),
    /// Park the request until reachability is restored. Does not consume
    /// a retry attempt.
    RetryWhenReachable,
    /// Surface the failure to the caller; no further automatic action.
    FailTerminal,
}

/// Per-request retry configuration. Fixed at request construction; never
/// mutated mid-flight.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Delay before a timed retry.
    pub break_time: Duration,
    /// Inclusive ceiling on retry attempts (0 = no retries).
    pub max_retry_count: u32,
    /// Whether retries may proceed while the process is backgrounded.
    pub enable_background_retry: bool,
    /// Fail immediately (no transport contact) when reachability is down
    /// at dispatch time, instead of queuing.
    pub fail_when_not_reachable: bool,
    /// Optional force-fail predicate, checked before everything else.
    pub fail_on_error: Option<FailOnError>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            break_time: Duration::from_secs(5),
            max_retry_count: 5,
            enable_background_retry: true,
            fail_when_not_reachable: false,
            fail_on_error: None,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retry_count: 0,
            ..Self::default()
        }
    }

    pub fn with_fail_on_error(
        mut self,
        predicate: impl Fn(&DispatchError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.fail_on_error = Some(Arc::new(predicate));
        self
    }

    /// Classifies one attempt's outcome into a [`RetryDecision`].
    ///
    /// `attempts_made` counts completed submissions including the one that
    /// just failed, so a policy with `max_retry_count = N` allows exactly
    /// N + 1 submissions. The rule order is load-bearing: the force-fail
    /// predicate and cancellation checks precede the count ceiling so
    /// callers can force-fail independent of count, and reachability is
    /// checked before committing to a timed retry.
    pub fn classify(
        &self,
        outcome: Result<&Response, &DispatchError>,
        attempts_made: u32,
        backgrounded: bool,
        reachable: bool,
    ) -> RetryDecision {
        let error = match outcome {
            Ok(_) => return RetryDecision::Succeed,
            Err(e) => e,
        };

        if let Some(predicate) = &self.fail_on_error {
            if predicate(error) {
                return RetryDecision::FailTerminal;
            }
        }
        if matches!(
            error,
            DispatchError::Cancelled | DispatchError::Configuration(_)
        ) {
            return RetryDecision::FailTerminal;
        }
        if attempts_made > self.max_retry_count {
            return RetryDecision::FailTerminal;
        }
        if backgrounded && !self.enable_background_retry {
            return RetryDecision::FailTerminal;
        }
        if !reachable {
            return RetryDecision::RetryWhenReachable;
        }
        if self.break_time.is_zero() {
            RetryDecision::RetryNow
        } else {
            RetryDecision::RetryAfterDelay(self.break_time)
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("break_time", &self.break_time)
            .field("max_retry_count", &self.max_retry_count)
            .field("enable_background_retry", &self.enable_background_retry)
            .field("fail_when_not_reachable", &self.fail_when_not_reachable)
            .field("fail_on_error", &self.fail_on_error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    fn transport_err() -> DispatchError {
        DispatchError::Transport {
            status: Some(500),
            error: TransportError::Status(500),
        }
    }

    #[test]
    fn success_outcome_succeeds() {
        let p = RetryPolicy::default();
        let resp = Response {
            status: 200,
            body: Vec::new(),
        };
        assert_eq!(p.classify(Ok(&resp), 1, false, true), RetryDecision::Succeed);
    }

    #[test]
    fn retries_until_count_exhausted() {
        let mut p = RetryPolicy::default();
        p.max_retry_count = 2;
        let err = transport_err();
        assert!(matches!(
            p.classify(Err(&err), 1, false, true),
            RetryDecision::RetryAfterDelay(_)
        ));
        assert!(matches!(
            p.classify(Err(&err), 2, false, true),
            RetryDecision::RetryAfterDelay(_)
        ));
        assert_eq!(
            p.classify(Err(&err), 3, false, true),
            RetryDecision::FailTerminal
        );
    }

    #[test]
    fn zero_retry_count_means_no_retries() {
        let mut p = RetryPolicy::default();
        p.max_retry_count = 0;
        let err = transport_err();
        assert_eq!(
            p.classify(Err(&err), 1, false, true),
            RetryDecision::FailTerminal
        );
    }

    #[test]
    fn predicate_beats_retry_count() {
        let p = RetryPolicy::default().with_fail_on_error(|e| e.status() == Some(500));
        let err = transport_err();
        assert_eq!(
            p.classify(Err(&err), 1, false, true),
            RetryDecision::FailTerminal
        );
    }

    #[test]
    fn cancellation_is_always_terminal() {
        let p = RetryPolicy::default();
        assert_eq!(
            p.classify(Err(&DispatchError::Cancelled), 1, false, true),
            RetryDecision::FailTerminal
        );
        // Even while unreachable: a deliberate cancel is never parked.
        assert_eq!(
            p.classify(Err(&DispatchError::Cancelled), 1, false, false),
            RetryDecision::FailTerminal
        );
    }

    #[test]
    fn backgrounded_without_background_retry_fails() {
        let mut p = RetryPolicy::default();
        p.enable_background_retry = false;
        let err = transport_err();
        assert_eq!(
            p.classify(Err(&err), 1, true, true),
            RetryDecision::FailTerminal
        );
        // Foreground still retries.
        assert!(matches!(
            p.classify(Err(&err), 1, false, true),
            RetryDecision::RetryAfterDelay(_)
        ));
    }

    #[test]
    fn unreachable_parks_before_timed_retry() {
        let p = RetryPolicy::default();
        let err = transport_err();
        assert_eq!(
            p.classify(Err(&err), 1, false, false),
            RetryDecision::RetryWhenReachable
        );
    }

    #[test]
    fn zero_break_time_retries_immediately() {
        let mut p = RetryPolicy::default();
        p.break_time = Duration::ZERO;
        let err = transport_err();
        assert_eq!(p.classify(Err(&err), 1, false, true), RetryDecision::RetryNow);
    }

    #[test]
    fn delayed_retry_uses_break_time() {
        let mut p = RetryPolicy::default();
        p.break_time = Duration::from_secs(7);
        let err = transport_err();
        assert_eq!(
            p.classify(Err(&err), 1, false, true),
            RetryDecision::RetryAfterDelay(Duration::from_secs(7))
        );
    }
}

//! Retry policy and outcome classification.
//!
//! This module owns the decision function: given an outcome, the attempt
//! count, and the current background/reachability state, decide whether a
//! request succeeds, retries (now, after a delay, or once reachable), or
//! fails terminally. The dispatcher consumes decisions; it never embeds
//! classification rules of its own.

mod policy;

pub use policy::{FailOnError, RetryDecision, RetryPolicy};

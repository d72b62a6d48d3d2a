//! Background-execution host seam.
//!
//! The platform layer knows whether the process is backgrounded and may be
//! able to buy extra execution time around background-session work. The
//! begin/end hooks are best-effort only; correctness never depends on
//! them.

/// Capability the dispatcher consults for background state.
pub trait BackgroundHost: Send + Sync + 'static {
    /// Whether the hosting process is currently backgrounded.
    fn is_backgrounded(&self) -> bool;

    /// Best-effort start of an extended-execution window.
    fn begin_background_work(&self) {}

    /// Releases the window opened by `begin_background_work`.
    fn end_background_work(&self) {}
}

/// Host for environments without a background state (tests, servers,
/// CLIs): never backgrounded, hooks are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct Foreground;

impl BackgroundHost for Foreground {
    fn is_backgrounded(&self) -> bool {
        false
    }
}

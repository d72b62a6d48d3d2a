//! Reachability status feed.
//!
//! Detection is external: a platform layer observes connectivity and
//! publishes status changes through a [`ReachabilityMonitor`]. The
//! dispatcher only consumes the watch channel and only distinguishes the
//! NotReachable boundary; `Unknown` counts as reachable.

use tokio::sync::watch;

/// Network reachability as reported by the external monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkStatus {
    #[default]
    Unknown,
    NotReachable,
    ViaCellular,
    ViaWiFi,
}

impl NetworkStatus {
    /// Only `NotReachable` suspends dispatch; `Unknown` is treated as up.
    pub fn is_down(self) -> bool {
        matches!(self, NetworkStatus::NotReachable)
    }
}

/// Publishing side of the reachability feed.
///
/// Keep the monitor alive for as long as status updates should flow; the
/// dispatcher holds receivers and keeps using the last published value if
/// the monitor is dropped.
#[derive(Debug)]
pub struct ReachabilityMonitor {
    tx: watch::Sender<NetworkStatus>,
}

impl ReachabilityMonitor {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(NetworkStatus::Unknown);
        Self { tx }
    }

    pub fn with_status(status: NetworkStatus) -> Self {
        let (tx, _rx) = watch::channel(status);
        Self { tx }
    }

    /// Publishes a status change to all subscribers.
    pub fn publish(&self, status: NetworkStatus) {
        if self.tx.send(status).is_err() {
            tracing::trace!(?status, "reachability change with no subscribers");
        }
    }

    pub fn status(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }
}

impl Default for ReachabilityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_not_reachable_is_down() {
        assert!(NetworkStatus::NotReachable.is_down());
        assert!(!NetworkStatus::Unknown.is_down());
        assert!(!NetworkStatus::ViaCellular.is_down());
        assert!(!NetworkStatus::ViaWiFi.is_down());
    }

    #[test]
    fn subscribers_see_published_status() {
        let monitor = ReachabilityMonitor::new();
        let rx = monitor.subscribe();
        monitor.publish(NetworkStatus::ViaWiFi);
        assert_eq!(*rx.borrow(), NetworkStatus::ViaWiFi);
        assert_eq!(monitor.status(), NetworkStatus::ViaWiFi);
    }
}

//! Process-wide stop flag.
//!
//! Starts out receiving and can only ever be switched off. Cloned handles
//! share the same flag, so the status observer, the event loop and the
//! signal handler all see the same state.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Liveness {
    stopped: Arc<watch::Sender<bool>>,
}

impl Liveness {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            stopped: Arc::new(tx),
        }
    }

    pub fn is_receiving(&self) -> bool {
        !*self.stopped.borrow()
    }

    /// Request the event loop to stop at its next iteration boundary.
    /// Returns true if this call made the transition.
    pub fn stop(&self) -> bool {
        !self.stopped.send_replace(true)
    }

    /// Resolves once the flag has been switched off.
    pub async fn stopped(&self) {
        let mut rx = self.stopped.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_starts_receiving() {
        assert!(Liveness::new().is_receiving());
    }

    #[test]
    fn test_stop_is_monotonic() {
        let liveness = Liveness::new();
        let observer = liveness.clone();

        assert!(observer.stop());
        assert!(!liveness.is_receiving());

        // Repeated stops never flip it back
        assert!(!observer.stop());
        assert!(!liveness.stop());
        assert!(!liveness.is_receiving());
    }

    #[tokio::test]
    async fn test_stopped_wakes_waiter() {
        let liveness = Liveness::new();
        let waiter = liveness.clone();

        let handle = tokio::spawn(async move { waiter.stopped().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        liveness.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stopped_resolves_when_already_stopped() {
        let liveness = Liveness::new();
        liveness.stop();

        tokio::time::timeout(Duration::from_millis(100), liveness.stopped())
            .await
            .unwrap();
    }
}

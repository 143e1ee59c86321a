//! Run-level cancellation
//!
//! A [`Shutdown`] is triggered once (Ctrl-C or a fatal error) and observed by
//! every task holding a [`ShutdownSignal`].

use tokio::sync::watch;

/// Triggers cancellation of a run
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Observes cancellation of a run
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl Shutdown {
    /// Create a trigger with no observers yet
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// New observer
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Cancel the run; later calls have no effect
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the run was cancelled
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Signal that never fires
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Whether the run was cancelled
    pub fn is_triggered(&self) -> bool {
        self.rx.as_ref().map_or(false, |rx| *rx.borrow())
    }

    /// Resolve once the run is cancelled
    ///
    /// If the trigger is dropped without firing this never resolves.
    pub async fn triggered(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_observers() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.signal();
        let mut b = shutdown.signal();
        assert!(!a.is_triggered());

        shutdown.trigger();
        a.triggered().await;
        b.triggered().await;
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_signal_created_after_trigger_sees_it() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut late = shutdown.signal();
        assert!(late.is_triggered());
        late.triggered().await;
    }

    #[tokio::test]
    async fn test_dropped_trigger_stays_pending() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.signal();
        drop(shutdown);

        let result = tokio::time::timeout(Duration::from_millis(50), signal.triggered()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_never() {
        let mut signal = ShutdownSignal::never();
        let result = tokio::time::timeout(Duration::from_millis(20), signal.triggered()).await;
        assert!(result.is_err());
    }
}

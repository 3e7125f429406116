//! # Shutdown Signal
//!
//! One-shot broadcast cancellation shared by the control loop, the pool
//! workers and every in-flight retry loop. Built on `tokio::sync::watch`,
//! the way the node runtime signals shutdown to its subsystems.

use tokio::sync::watch;

/// Fires the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Observes the shutdown signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    /// Fire the signal. Firing twice is a no-op.
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new observer of this trigger.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl ShutdownSignal {
    /// Whether the signal has fired.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal fires.
    ///
    /// Also resolves if the trigger is dropped without firing, so waiters
    /// never hang on an abandoned trigger.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Err means every trigger is gone
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fire_wakes_waiters() {
        let (trigger, signal) = shutdown_channel();
        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.cancelled().await }
        });

        assert!(!signal.is_shutdown());
        trigger.fire();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn test_already_fired_resolves_immediately() {
        let (trigger, signal) = shutdown_channel();
        trigger.fire();
        trigger.fire();
        assert!(trigger.is_fired());
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("should resolve at once");
    }

    #[tokio::test]
    async fn test_dropped_trigger_releases_waiters() {
        let (trigger, signal) = shutdown_channel();
        drop(trigger);
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("should resolve when trigger is gone");
    }

    #[tokio::test]
    async fn test_subscribe_sees_fire() {
        let (trigger, _signal) = shutdown_channel();
        let late = trigger.subscribe();
        trigger.fire();
        assert!(late.is_shutdown());
    }
}

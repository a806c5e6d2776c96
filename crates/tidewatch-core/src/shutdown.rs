//! Cooperative shutdown.
//!
//! A `ShutdownCoordinator` owns a single `watch` flag that flips from
//! `false` to `true` exactly once. Every long-running task holds a
//! `ShutdownSignal` (or a raw receiver) and checks it at its loop
//! boundaries; nothing is interrupted mid-request. OS signals only
//! trigger the coordinator.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Returns `true` only for the call that flipped the
    /// flag; later calls are no-ops.
    pub fn trigger(&self) -> bool {
        let flipped = self.tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });
        if flipped {
            debug!("shutdown triggered");
        }
        flipped
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Raw receiver for loops that select on `changed()` directly.
    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Spawn a task that triggers shutdown on Ctrl-C (and SIGTERM on unix).
    pub fn trigger_on_os_signal(&self) {
        let coordinator = self.clone();
        let mut signal = self.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                name = wait_for_os_signal() => {
                    info!(signal = name, "received signal, shutting down gracefully");
                    coordinator.trigger();
                }
                _ = signal.triggered() => {}
            }
        });
    }
}

/// Receiving half handed to each task.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested (immediately if it already
    /// was). A dropped coordinator counts as shutdown.
    pub async fn triggered(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            debug!("shutdown coordinator dropped");
        }
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                name = ctrl_c() => name,
                _ = term.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl-C handler");
        // Without a handler the process can only be stopped externally.
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn trigger_is_settable_once() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_triggered());
        assert!(coordinator.trigger());
        assert!(!coordinator.trigger());
        assert!(coordinator.is_triggered());
    }

    #[test]
    fn subscribers_observe_trigger() {
        let coordinator = ShutdownCoordinator::new();
        let a = coordinator.subscribe();
        let b = a.clone();
        coordinator.trigger();
        assert!(a.is_triggered());
        assert!(b.is_triggered());
    }

    #[tokio::test]
    async fn late_subscriber_resolves_immediately() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.trigger();
        let mut signal = coordinator.subscribe();
        tokio::time::timeout(Duration::from_secs(1), signal.triggered())
            .await
            .expect("already-triggered signal should resolve");
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_wake_on_trigger() {
        let coordinator = ShutdownCoordinator::new();
        let mut signal = coordinator.subscribe();
        let waiter = tokio::spawn(async move {
            signal.triggered().await;
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!waiter.is_finished());

        coordinator.trigger();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_coordinator_releases_waiters() {
        let coordinator = ShutdownCoordinator::new();
        let mut signal = coordinator.subscribe();
        drop(coordinator);
        tokio::time::timeout(Duration::from_secs(1), signal.triggered())
            .await
            .expect("dropped coordinator should release waiters");
    }

    #[test]
    fn raw_receiver_sees_trigger() {
        let coordinator = ShutdownCoordinator::new();
        let rx = coordinator.receiver();
        coordinator.trigger();
        assert!(*rx.borrow());
    }
}

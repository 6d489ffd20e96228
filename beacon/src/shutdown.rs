//! Graceful shutdown signalling for engine background tasks.
//!
//! Tasks call [`subscribe`] to get a receiver, then `select!` on it
//! alongside their main loop. When shutdown is triggered, every receiver
//! is notified and blocked timers unblock.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

/// Coordinates shutdown across the layer listener, cleanup task, and
/// per-epoch schedulers.
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    down: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            down: AtomicBool::new(false),
        }
    }

    /// Get a receiver that will be notified on shutdown.
    ///
    /// Subscribe before checking [`is_shut_down`] to avoid missing a
    /// notification sent in between.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown.
    pub fn shutdown(&self) {
        self.down.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    /// Whether shutdown has been triggered.
    pub fn is_shut_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_notifies_subscribers() {
        let controller = ShutdownController::new();
        let mut rx = controller.subscribe();
        controller.shutdown();
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn multiple_subscribers_all_notified() {
        let controller = ShutdownController::new();
        let mut rx1 = controller.subscribe();
        let mut rx2 = controller.subscribe();
        controller.shutdown();
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[test]
    fn is_shut_down_reflects_state() {
        let controller = ShutdownController::new();
        assert!(!controller.is_shut_down());
        controller.shutdown();
        assert!(controller.is_shut_down());
    }
}

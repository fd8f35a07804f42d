// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Graceful shutdown coordination.
//!
//! Handles SIGTERM/SIGINT (Unix) or Ctrl+C (Windows) and fans the signal
//! out to subscribed components over a broadcast channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

/// Coordinates graceful shutdown across components.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    sender: broadcast::Sender<()>,
    initiated: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Creates a new coordinator.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribes to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Initiates shutdown; idempotent.
    pub fn initiate(&self) {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Shutdown initiated");
            let _ = self.sender.send(());
        }
    }

    /// Returns `true` once shutdown has been initiated.
    pub fn is_initiated(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Blocks until an OS signal arrives or shutdown is initiated manually.
    pub async fn wait_for_shutdown(&self) {
        if self.is_initiated() {
            return;
        }

        let mut rx = self.subscribe();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
                _ = rx.recv() => {}
            }
        }

        #[cfg(windows)]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.expect("Failed to register Ctrl+C handler");
                    info!("Received Ctrl+C");
                }
                _ = rx.recv() => {}
            }
        }

        self.initiate();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_manual_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        assert!(!coordinator.is_initiated());
        coordinator.initiate();
        assert!(coordinator.is_initiated());
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_double_initiate_is_idempotent() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.initiate();
        coordinator.initiate();
        assert!(coordinator.is_initiated());
    }

    #[tokio::test]
    async fn test_wait_resolves_on_manual_initiate() {
        let coordinator = ShutdownCoordinator::new();
        let waiter = coordinator.clone();

        let handle = tokio::spawn(async move {
            waiter.wait_for_shutdown().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        coordinator.initiate();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("wait_for_shutdown should resolve")
            .unwrap();
    }
}

//! Shutdown coordination for the gateway.

use tokio::sync::broadcast;

use super::signals::wait_for_shutdown_signal;

/// Fans one stop request out to every long-running task: the gateway
/// listener and the metrics exposition server.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Receiver that resolves once [`trigger`](Self::trigger) is called.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify every subscriber. Returns how many were listening.
    pub fn trigger(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }

    /// Tasks still subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Wait for Ctrl-C or SIGTERM, then trigger.
    pub async fn trigger_on_signal(self) {
        let signal = wait_for_shutdown_signal().await;
        tracing::info!(signal, "Shutdown signal received");
        let notified = self.trigger();
        tracing::debug!(tasks = notified, "Shutdown broadcast sent");
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_is_notified() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        assert_eq!(shutdown.trigger(), 2);
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[test]
    fn trigger_without_subscribers_is_harmless() {
        assert_eq!(Shutdown::new().trigger(), 0);
    }
}

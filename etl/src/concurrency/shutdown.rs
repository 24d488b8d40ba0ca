//! Broadcast shutdown signal for long-running replication loops.

use tokio::sync::watch;

/// Receiving side of the shutdown signal.
///
/// A change notification means shutdown was requested. Loops poll it between units of work, so
/// a unit that already started always completes.
pub type ShutdownRx = watch::Receiver<()>;

/// Sending side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Notifies every subscriber that shutdown was requested.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a shutdown channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}

/// Returns `true` when shutdown was requested since `rx` last observed the channel.
pub fn is_shutdown_requested(rx: &ShutdownRx) -> bool {
    rx.has_changed().unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_shutdown() {
        let (tx, rx) = create_shutdown_channel();
        let mut late = tx.subscribe();

        assert!(!is_shutdown_requested(&rx));
        tx.shutdown().unwrap();

        assert!(is_shutdown_requested(&rx));
        assert!(late.changed().await.is_ok());
    }
}

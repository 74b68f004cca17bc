// src/core/abort.rs — Race-scoped cooperative cancellation

use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of the abort signal. Cloning shares the same signal.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal. Idempotent.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observer side, handed to in-flight work.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is raised. Never resolves if the handle is
    /// dropped without aborting.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_observes_abort() {
        let handle = AbortHandle::new();
        let signal = handle.signal();
        assert!(!signal.is_aborted());

        let waiter = tokio::spawn(async move {
            signal.aborted().await;
            true
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        handle.abort();
        assert!(waiter.await.unwrap());
        assert!(handle.is_aborted());
    }

    #[tokio::test]
    async fn test_signal_created_after_abort() {
        let handle = AbortHandle::new();
        handle.abort();
        handle.abort();
        let signal = handle.signal();
        assert!(signal.is_aborted());
        tokio::time::timeout(Duration::from_millis(50), signal.aborted())
            .await
            .expect("already-aborted signal resolves immediately");
    }

    #[tokio::test]
    async fn test_not_aborted_stays_pending() {
        let handle = AbortHandle::new();
        let signal = handle.signal();
        let res = tokio::time::timeout(Duration::from_millis(20), signal.aborted()).await;
        assert!(res.is_err());
    }
}

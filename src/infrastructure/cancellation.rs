//! Batch Cancellation
//!
//! A cloneable cancellation handle shared by every task of one lookup batch.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Cancellation context for a lookup batch.
///
/// Cloning is cheap; all clones observe the same signal. Once cancelled
/// a context stays cancelled.
#[derive(Clone)]
pub struct BatchContext {
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl BatchContext {
    /// Create a context that is not cancelled.
    pub fn new() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            cancel_tx: Arc::new(cancel_tx),
        }
    }

    /// Cancel the batch. Idempotent.
    pub fn cancel(&self) {
        if !self.cancel_tx.send_replace(true) {
            tracing::info!("lookup batch cancelled");
        }
    }

    /// Cancel the batch once `after` has elapsed.
    pub fn cancel_after(&self, after: Duration) {
        let ctx = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => {
                    tracing::warn!("lookup batch timed out after {:?}", after);
                    ctx.cancel();
                }
                _ = ctx.cancelled() => {}
            }
        });
    }

    /// Whether the batch has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Completes once the batch is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender lives as long as `self`; unreachable in practice.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Drive `fut` unless the batch is cancelled first.
    ///
    /// Returns `None` when cancellation won; `fut` is dropped at that point.
    pub async fn run<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

impl Default for BatchContext {
    fn default() -> Self {
        Self::new()
    }
}

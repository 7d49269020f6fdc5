//! Cooperative, hierarchical cancellation.
//!
//! A [`CancelToken`] is cancelled when it, or any token it was derived
//! from, is cancelled. Cancelling a child leaves its parent and siblings
//! untouched. Long-running steps `select!` on [`CancelToken::cancelled`]
//! next to their work.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// An operation stopped because its token was cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("cancelled")]
pub struct Cancelled;

#[derive(Clone, Debug)]
pub struct CancelToken {
    own: Arc<watch::Sender<bool>>,
    /// Receivers for this token and every ancestor, root first.
    chain: Vec<watch::Receiver<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            own: Arc::new(tx),
            chain: vec![rx],
        }
    }

    /// A token cancelled with `self`, but cancellable on its own.
    pub fn child(&self) -> Self {
        let (tx, rx) = watch::channel(false);
        let mut chain = self.chain.clone();
        chain.push(rx);
        Self {
            own: Arc::new(tx),
            chain,
        }
    }

    pub fn cancel(&self) {
        self.own.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.chain.iter().any(|rx| *rx.borrow())
    }

    /// Resolves once this token or an ancestor is cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let mut receivers = self.chain.clone();
        let waits = receivers.iter_mut().map(|rx| {
            Box::pin(async move {
                let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                if closed {
                    // Every handle to that ancestor is gone; it can no longer fire.
                    std::future::pending::<()>().await;
                }
            })
        });
        futures_util::future::select_all(waits).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

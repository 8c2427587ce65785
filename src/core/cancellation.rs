//! Cooperative cancellation for pipeline runs

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

/// A cloneable token for cooperative cancellation.
///
/// Cancellation is idempotent; only the first reason is kept. Every clone
/// observes the same state.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<bool>,
    reason: RwLock<Option<String>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state,
                reason: RwLock::new(None),
            }),
        }
    }

    /// Request cancellation
    pub fn cancel(&self, reason: impl Into<String>) {
        {
            let mut current = self.inner.reason.write();
            if current.is_none() {
                *current = Some(reason.into());
            }
        }
        self.inner.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// The first cancellation reason, if cancelled
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Wait until cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives as long as `self`, so this only returns once cancelled
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

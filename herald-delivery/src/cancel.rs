//! Cooperative cancellation for a campaign run

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use thiserror::Error;
use tokio::sync::Notify;

/// Returned by waits that were cut short by cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Run cancelled")]
pub struct Cancelled;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Flag shared by everything working on one run
///
/// Workers poll [`is_cancelled`](Self::is_cancelled) between recipients;
/// anything that suspends (rate limiting, backoff) races against
/// [`cancelled`](Self::cancelled) so a cancelled run never waits out a delay.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns `false` if it was already raised.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::SeqCst);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is raised
    pub async fn cancelled(&self) {
        loop {
            // Registered before the check so a concurrent `cancel` is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

//! Cancellation scope and token for coordinating blocked operations.
//!
//! A [`CancellationScope`] is the owning side: it cancels exactly once and
//! hands out [`CancellationToken`]s. Tokens are cheap to clone and can be
//! awaited; a wait site typically selects over a caller-supplied token and
//! the channel's internal token so that either source unblocks it.

use tokio::sync::watch;

/// The owning side of a cancellation signal.
#[derive(Debug)]
pub struct CancellationScope {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for CancellationScope {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationScope {
    /// A scope in the not-cancelled state.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// A token observing this scope.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            rx: self.rx.clone(),
        }
    }

    /// Cancel the scope, waking every token. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Whether the scope has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// An observer of a [`CancellationScope`], or a standalone never-cancelled
/// token for callers that do not need cancellation.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    /// A token that is never cancelled.
    pub fn none() -> Self {
        static NONE: std::sync::OnceLock<(watch::Sender<bool>, watch::Receiver<bool>)> =
            std::sync::OnceLock::new();
        let (_, rx) = NONE.get_or_init(|| watch::channel(false));
        Self { rx: rx.clone() }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is requested.
    ///
    /// Resolves immediately if the scope was already cancelled or dropped.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        loop {
            if rx.changed().await.is_err() {
                // Scope dropped: treat as cancelled so waiters don't hang.
                return;
            }
            if *rx.borrow() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn cancel_wakes_tokens() {
        let scope = CancellationScope::new();
        let token = scope.token();
        assert!(!token.is_cancelled());

        let waiter = tokio::spawn(async move { token.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        scope.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_when_already_cancelled() {
        let scope = CancellationScope::new();
        scope.cancel();
        let token = scope.token();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_scope_counts_as_cancelled() {
        let scope = CancellationScope::new();
        let token = scope.token();
        drop(scope);
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn none_token_never_fires() {
        let token = CancellationToken::none();
        let result =
            tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(result.is_err());
    }

    #[test]
    fn cancel_is_idempotent() {
        let scope = CancellationScope::new();
        scope.cancel();
        scope.cancel();
        assert!(scope.is_cancelled());
    }
}

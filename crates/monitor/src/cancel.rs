use tokio::sync::watch;

/// Owning side of a cancellation signal. Dropping the source counts as
/// cancelling it, so tasks never outlive a discarded session run.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable observer handed to every task that must stop when its source
/// fires.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the source is cancelled or dropped.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // `wait_for` errors only when the sender is gone, which is cancellation too.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn token_observes_cancel() {
        let source = CancelSource::new();
        let token = source.token();
        assert!(!token.is_cancelled());

        let waiter = tokio::spawn({
            let token = token.clone();
            async move { token.cancelled().await }
        });
        source.cancel();

        timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter wakes")
            .expect("waiter joins");
        assert!(token.is_cancelled());
        assert!(source.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_source_cancels_tokens() {
        let source = CancelSource::new();
        let token = source.token();
        drop(source);

        assert!(token.is_cancelled());
        timeout(Duration::from_millis(200), token.cancelled())
            .await
            .expect("dropped source resolves immediately");
    }

    #[tokio::test]
    async fn uncancelled_token_stays_pending() {
        let source = CancelSource::new();
        let token = source.token();
        assert!(timeout(Duration::from_millis(30), token.cancelled())
            .await
            .is_err());
    }
}

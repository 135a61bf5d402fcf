//! Playback session tokens
//!
//! A [`SessionClock`] is a single-writer generation counter. Every start or
//! stop bumps it; a [`SessionToken`] remembers the generation it was issued
//! for and reports itself stale once the clock has moved on.

use std::sync::Arc;

use tokio::sync::watch;

/// Source of session tokens for one sequencer
#[derive(Debug, Clone)]
pub struct SessionClock {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionClock {
    /// Create a clock at generation zero
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Supersede the current session and issue a token for a new one
    #[must_use]
    pub fn begin(&self) -> SessionToken {
        let id = self.bump();
        SessionToken {
            id,
            rx: self.tx.subscribe(),
        }
    }

    /// Supersede the current session without starting another
    pub fn invalidate(&self) {
        self.bump();
    }

    /// Current generation
    #[must_use]
    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    fn bump(&self) -> u64 {
        let mut id = 0;
        self.tx.send_modify(|generation| {
            *generation += 1;
            id = *generation;
        });
        id
    }
}

/// Proof that an operation belongs to a particular session
#[derive(Debug, Clone)]
pub struct SessionToken {
    id: u64,
    rx: watch::Receiver<u64>,
}

impl SessionToken {
    /// Generation this token was issued for
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Whether no newer session has been started or the session stopped
    #[must_use]
    pub fn is_current(&self) -> bool {
        *self.rx.borrow() == self.id
    }

    /// Resolve once this session has been superseded
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() != self.id {
                return;
            }
            // Clock dropped: nothing left to resume this session
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_begin_supersedes_previous() {
        let clock = SessionClock::new();
        let first = clock.begin();
        assert!(first.is_current());

        let second = clock.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(second.id() > first.id());
    }

    #[test]
    fn test_invalidate() {
        let clock = SessionClock::new();
        let token = clock.begin();
        clock.invalidate();
        assert!(!token.is_current());
        assert_eq!(clock.current(), token.id() + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wakes_on_invalidate() {
        let clock = SessionClock::new();
        let token = clock.begin();

        let waiter = tokio::spawn({
            let token = token.clone();
            async move { token.cancelled().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        clock.invalidate();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() did not resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_stale() {
        let clock = SessionClock::new();
        let token = clock.begin();
        let _newer = clock.begin();
        token.cancelled().await;
    }
}

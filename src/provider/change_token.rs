//! One-shot change notification.
//!
//! A `ChangeToken` is created with each snapshot and fired once, when that
//! snapshot is replaced. Consumers either await [`ChangeToken::fired`] or
//! register a callback; after it fires the token is inert and the consumer
//! re-reads the provider and subscribes to the new token.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct TokenState {
    tx: watch::Sender<bool>,
    fired: AtomicBool,
    callbacks: Mutex<Vec<Callback>>,
}

/// Cloneable handle to a one-shot signal.
#[derive(Clone)]
pub struct ChangeToken {
    state: Arc<TokenState>,
}

impl ChangeToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            state: Arc::new(TokenState {
                tx,
                fired: AtomicBool::new(false),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_fired(&self) -> bool {
        self.state.fired.load(Ordering::Acquire)
    }

    /// Resolve once the token fires. Returns immediately if it already has.
    pub async fn fired(&self) {
        let mut rx = self.state.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// Run `callback` when the token fires, or right now if it already has.
    ///
    /// Returns `true` when the callback was queued rather than run inline.
    pub fn register<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut callbacks = self.callbacks();
        if self.is_fired() {
            drop(callbacks);
            callback();
            return false;
        }
        callbacks.push(Box::new(callback));
        true
    }

    /// Fire the token. Only the first call has any effect.
    pub(crate) fn fire(&self) -> bool {
        let pending = {
            let mut callbacks = self.callbacks();
            if self.state.fired.swap(true, Ordering::AcqRel) {
                return false;
            }
            std::mem::take(&mut *callbacks)
        };

        self.state.tx.send_replace(true);
        for callback in pending {
            callback();
        }
        true
    }

    /// Whether two handles refer to the same token.
    pub fn same_token(&self, other: &ChangeToken) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn callbacks(&self) -> MutexGuard<'_, Vec<Callback>> {
        self.state
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ChangeToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeToken")
            .field("fired", &self.is_fired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_fires_once() {
        let token = ChangeToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        assert!(token.register(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(!token.is_fired());
        assert!(token.fire());
        assert!(!token.fire());
        assert!(token.is_fired());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_after_fire_runs_inline() {
        let token = ChangeToken::new();
        token.fire();

        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        assert!(!token.register(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let token = ChangeToken::new();
        let clone = token.clone();
        assert!(token.same_token(&clone));
        assert!(!token.same_token(&ChangeToken::new()));

        clone.fire();
        assert!(token.is_fired());
    }

    #[tokio::test]
    async fn test_fired_wakes_waiters() {
        let token = ChangeToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.fired().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        token.fire();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_fired_returns_immediately_when_already_fired() {
        let token = ChangeToken::new();
        token.fire();
        tokio::time::timeout(Duration::from_millis(100), token.fired())
            .await
            .unwrap();
    }
}

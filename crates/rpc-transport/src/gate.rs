//! One-shot gate.
//!
//! A gate starts closed and is opened exactly once. Any number of tasks may
//! wait for it; waiting on an open gate returns immediately. Concurrent
//! `set` calls are safe: the first one opens the gate, the rest are no-ops.

use std::sync::Arc;

use tokio::sync::watch;

/// Set-once signal shared between tasks and threads.
#[derive(Debug, Clone)]
pub struct Gate {
    state: Arc<watch::Sender<bool>>,
}

impl Gate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Open the gate.
    ///
    /// Returns `true` for the call that actually opened it. Safe to call
    /// from non-async contexts such as signal handlers.
    pub fn set(&self) -> bool {
        self.state.send_if_modified(|open| {
            if *open {
                false
            } else {
                *open = true;
                true
            }
        })
    }

    pub fn is_set(&self) -> bool {
        *self.state.borrow()
    }

    /// Wait until the gate is open.
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_set_once() {
        let gate = Gate::new();
        assert!(!gate.is_set());
        assert!(gate.set());
        assert!(gate.is_set());
        assert!(!gate.set());
        assert!(gate.is_set());
    }

    #[tokio::test]
    async fn test_wait_after_set_returns_immediately() {
        let gate = Gate::new();
        gate.set();
        tokio::time::timeout(Duration::from_millis(10), gate.wait())
            .await
            .expect("open gate releases waiters at once");
    }

    #[tokio::test]
    async fn test_many_waiters_released() {
        let gate = Gate::new();
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        gate.set();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter released")
                .unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_blocks_while_closed() {
        let gate = Gate::new();
        assert!(tokio::time::timeout(Duration::from_secs(5), gate.wait()).await.is_err());
        assert!(!gate.is_set());
    }

    #[test]
    fn test_concurrent_set_has_one_winner() {
        let gate = Gate::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.set())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(gate.is_set());
    }
}

//! Per-session serialization of `ask` requests.
//!
//! Two requests for the same (organization, session) never run their
//! pipelines concurrently, so history writes stay in request order.
//! Requests for different sessions do not contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type SessionKey = (i64, String);

/// Map of session key → async lock. Idle entries are pruned on acquire.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionKey, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one request.
pub struct SessionGuard {
    _guard: OwnedMutexGuard<()>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other request holds this session, then hold it.
    pub async fn acquire(&self, organization_id: i64, session_id: &str) -> SessionGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Only the map references an idle lock.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry((organization_id, session_id.to_string()))
                .or_default()
                .clone()
        };
        SessionGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of sessions currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_is_serialized() {
        let locks = Arc::new(SessionLocks::new());
        let first = locks.acquire(1, "s").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(1, "s").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_other_sessions_do_not_block() {
        let locks = SessionLocks::new();
        let _a = locks.acquire(1, "s").await;
        let _b = tokio::time::timeout(Duration::from_millis(200), locks.acquire(2, "s"))
            .await
            .unwrap();
        let _c = tokio::time::timeout(Duration::from_millis(200), locks.acquire(1, "t"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = SessionLocks::new();
        drop(locks.acquire(1, "a").await);
        drop(locks.acquire(1, "b").await);
        let _c = locks.acquire(1, "c").await;
        assert_eq!(locks.tracked(), 1);
    }
}

//! Per-user async locks.

use crate::domain::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry size above which idle entries are dropped on the next lock.
const PRUNE_THRESHOLD: usize = 256;

/// One async mutex per user, created on first use.
///
/// Entries nobody holds or waits on are pruned once the registry grows past
/// `PRUNE_THRESHOLD`.
#[derive(Debug, Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user`'s ledger.
    pub async fn lock(&self, user: &UserId) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if map.len() >= PRUNE_THRESHOLD {
                map.retain(|_, m| Arc::strong_count(m) > 1);
            }
            map.entry(user.clone()).or_default().clone()
        };
        mutex.lock_owned().await
    }

    /// Drop entries for users with no holder or waiter.
    pub fn prune(&self) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.retain(|_, m| Arc::strong_count(m) > 1);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

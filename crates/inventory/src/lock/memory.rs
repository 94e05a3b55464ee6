use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::{LockLease, LockManager};
use crate::Result;

struct Held {
    token: Uuid,
    expires_at: Instant,
}

/// Process-local lock manager.
///
/// Expiry runs on the tokio clock, so paused-time tests can expire leases.
#[derive(Clone, Default)]
pub struct InMemoryLockManager {
    held: Arc<Mutex<HashMap<String, Held>>>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` has an unexpired holder.
    pub async fn is_held(&self, key: &str) -> bool {
        self.held
            .lock()
            .await
            .get(key)
            .is_some_and(|h| h.expires_at > Instant::now())
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn try_acquire(&self, key: &str, lease: Duration) -> Result<Option<LockLease>> {
        let mut held = self.held.lock().await;
        let now = Instant::now();
        if held.get(key).is_some_and(|h| h.expires_at > now) {
            return Ok(None);
        }

        let token = Uuid::new_v4();
        held.insert(
            key.to_string(),
            Held {
                token,
                expires_at: now + lease,
            },
        );
        Ok(Some(LockLease {
            key: key.to_string(),
            token,
            expires_at: Utc::now() + lease,
        }))
    }

    async fn release(&self, lease: &LockLease) -> Result<()> {
        let mut held = self.held.lock().await;
        if held.get(&lease.key).is_some_and(|h| h.token == lease.token) {
            held.remove(&lease.key);
        }
        Ok(())
    }
}

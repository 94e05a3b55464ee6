//! Lease-based per-key locks.
//!
//! A lease is held until released or until it expires, whichever comes
//! first. Expired leases may be taken over by another owner so a crashed
//! holder never blocks a key forever.

mod memory;
mod postgres;

pub use memory::InMemoryLockManager;
pub use postgres::PostgresLockManager;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::GoodsId;
use uuid::Uuid;

use crate::{InventoryError, Result};

/// Interval between acquisition attempts while waiting.
const RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Lock key guarding the stock row of a goods item.
pub fn stock_lock_key(goods_id: GoodsId) -> String {
    format!("stock-lock-{goods_id}")
}

/// Proof of holding a lock. Only the owner token can release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    pub key: String,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Factory for mutual exclusion keyed by name.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Takes the lock if it is free or its lease has expired.
    async fn try_acquire(&self, key: &str, lease: Duration) -> Result<Option<LockLease>>;

    /// Releases a lease. Releasing a lease that expired and was taken over
    /// is a no-op.
    async fn release(&self, lease: &LockLease) -> Result<()>;

    /// Waits up to `wait` for the lock.
    ///
    /// Fails with [`InventoryError::LockAcquisitionFailed`] when the wait
    /// budget runs out.
    async fn acquire(&self, key: &str, lease: Duration, wait: Duration) -> Result<LockLease> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(acquired) = self.try_acquire(key, lease).await? {
                return Ok(acquired);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                tracing::debug!(key, "lock wait budget exhausted");
                return Err(InventoryError::LockAcquisitionFailed {
                    key: key.to_string(),
                });
            }
            tokio::time::sleep(RETRY_INTERVAL.min(deadline - now)).await;
        }
    }
}

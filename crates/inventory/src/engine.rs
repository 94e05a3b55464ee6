//! Locked, ledger-checked stock reservation and rollback.

use std::sync::Arc;
use std::time::Duration;

use common::{GoodsId, OrderId};
use futures_util::future::join_all;

use crate::lock::{LockLease, LockManager, stock_lock_key};
use crate::model::{ReserveItem, RollbackOutcome, StockLevel};
use crate::store::StockStore;
use crate::{InventoryError, Result};

/// Lease and wait budget for the per-goods lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    /// How long a lease stays valid if its holder never releases it.
    pub lease: Duration,
    /// How long a caller waits for a busy lock before giving up.
    pub wait: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(8),
            wait: Duration::from_secs(3),
        }
    }
}

/// Reserves and restores stock under the per-goods lock.
///
/// Every mutation runs as: acquire the lock(s), run one store transaction,
/// release the lock(s) whatever the outcome. Rollback is idempotent through
/// the reservation ledger, so duplicate deliveries are harmless.
#[derive(Clone)]
pub struct ReservationEngine {
    store: Arc<dyn StockStore>,
    locks: Arc<dyn LockManager>,
    settings: LockSettings,
}

impl ReservationEngine {
    /// Creates an engine with default lock settings.
    pub fn new(store: Arc<dyn StockStore>, locks: Arc<dyn LockManager>) -> Self {
        Self::with_settings(store, locks, LockSettings::default())
    }

    pub fn with_settings(
        store: Arc<dyn StockStore>,
        locks: Arc<dyn LockManager>,
        settings: LockSettings,
    ) -> Self {
        Self {
            store,
            locks,
            settings,
        }
    }

    pub fn settings(&self) -> LockSettings {
        self.settings
    }

    /// Reserves `quantity` units of one goods item for an order.
    #[tracing::instrument(skip(self), fields(goods_id = %goods_id, order_id = %order_id))]
    pub async fn reserve(
        &self,
        goods_id: GoodsId,
        quantity: i64,
        order_id: OrderId,
    ) -> Result<StockLevel> {
        let mut levels = self
            .batch_reserve(order_id, &[ReserveItem::new(goods_id, quantity)])
            .await?;
        levels
            .pop()
            .ok_or(InventoryError::NotFound(goods_id))
    }

    /// Reserves several goods for one order, all or nothing.
    ///
    /// Locks are taken in ascending goods order so two batches over the same
    /// goods cannot deadlock.
    #[tracing::instrument(skip(self, items), fields(order_id = %order_id, items = items.len()))]
    pub async fn batch_reserve(
        &self,
        order_id: OrderId,
        items: &[ReserveItem],
    ) -> Result<Vec<StockLevel>> {
        validate_order(order_id)?;
        if items.is_empty() {
            return Err(InventoryError::InvalidArgument(
                "at least one item is required".to_string(),
            ));
        }
        for item in items {
            validate_goods(item.goods_id)?;
            if item.quantity <= 0 {
                return Err(InventoryError::InvalidArgument(format!(
                    "quantity must be positive, got {}",
                    item.quantity
                )));
            }
        }
        let mut goods: Vec<GoodsId> = items.iter().map(|i| i.goods_id).collect();
        goods.sort();
        goods.dedup();
        if goods.len() != items.len() {
            return Err(InventoryError::InvalidArgument(
                "goods ids must not repeat within one batch".to_string(),
            ));
        }

        let result = self
            .with_locks(&goods, self.store.reserve(order_id, items))
            .await;

        match &result {
            Ok(levels) => {
                metrics::counter!("stock_reservations_total").increment(levels.len() as u64);
                tracing::info!("stock reserved");
            }
            Err(InventoryError::Understock {
                goods_id,
                available,
                requested,
            }) => {
                metrics::counter!("stock_understock_total").increment(1);
                tracing::info!(%goods_id, available, requested, "understock");
            }
            Err(e) => tracing::warn!(error = %e, "reservation failed"),
        }
        result
    }

    /// Returns an order's reservation of one goods item to available stock.
    ///
    /// The ledger quantity is authoritative; `quantity` from the caller is
    /// only compared against it.
    #[tracing::instrument(skip(self), fields(goods_id = %goods_id, order_id = %order_id))]
    pub async fn rollback(
        &self,
        order_id: OrderId,
        goods_id: GoodsId,
        quantity: i64,
    ) -> Result<RollbackOutcome> {
        validate_order(order_id)?;
        validate_goods(goods_id)?;

        let result = self
            .with_locks(&[goods_id], self.store.rollback(order_id, goods_id))
            .await;

        match &result {
            Ok(RollbackOutcome::Restored { record, level }) => {
                if record.quantity != quantity {
                    tracing::warn!(
                        ledger_quantity = record.quantity,
                        message_quantity = quantity,
                        "rollback quantity differs from ledger, using ledger"
                    );
                }
                metrics::counter!("stock_rollbacks_total").increment(1);
                tracing::info!(
                    restored = record.quantity,
                    available = level.available,
                    "stock restored"
                );
            }
            Ok(RollbackOutcome::NotReserved) => {
                tracing::debug!("no reservation to restore");
            }
            Err(e @ InventoryError::InvariantViolation { .. }) => {
                tracing::error!(error = %e, "refusing to restore stock");
            }
            Err(e) => tracing::warn!(error = %e, "rollback failed"),
        }
        result
    }

    /// Reads the stock of one goods item.
    pub async fn get_stock(&self, goods_id: GoodsId) -> Result<StockLevel> {
        validate_goods(goods_id)?;
        self.store
            .get_stock(goods_id)
            .await?
            .ok_or(InventoryError::NotFound(goods_id))
    }

    /// Reads the stock of several goods; unknown ids are left out.
    pub async fn batch_get_stock(&self, goods_ids: &[GoodsId]) -> Result<Vec<StockLevel>> {
        for id in goods_ids {
            validate_goods(*id)?;
        }
        self.store.batch_get_stock(goods_ids).await
    }

    /// Sets the available count of a goods item, creating the row if needed.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(&self, goods_id: GoodsId, available: i64) -> Result<StockLevel> {
        validate_goods(goods_id)?;
        if available < 0 {
            return Err(InventoryError::InvalidArgument(format!(
                "stock must not be negative, got {available}"
            )));
        }
        self.with_locks(&[goods_id], self.store.set_stock(goods_id, available))
            .await
    }

    /// Runs `op` while holding the locks of `goods`, which must be sorted.
    async fn with_locks<T, F>(&self, goods: &[GoodsId], op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let mut leases: Vec<LockLease> = Vec::with_capacity(goods.len());
        for goods_id in goods {
            let key = stock_lock_key(*goods_id);
            match self
                .locks
                .acquire(&key, self.settings.lease, self.settings.wait)
                .await
            {
                Ok(lease) => leases.push(lease),
                Err(e) => {
                    self.release_all(&leases).await;
                    return Err(e);
                }
            }
        }

        let result = op.await;
        self.release_all(&leases).await;
        result
    }

    async fn release_all(&self, leases: &[LockLease]) {
        let released = join_all(leases.iter().map(|lease| self.locks.release(lease))).await;
        for (lease, outcome) in leases.iter().zip(released) {
            // The lease expires on its own if release fails.
            if let Err(e) = outcome {
                tracing::warn!(key = %lease.key, error = %e, "failed to release lock");
            }
        }
    }
}

fn validate_order(order_id: OrderId) -> Result<()> {
    if order_id.is_valid() {
        Ok(())
    } else {
        Err(InventoryError::InvalidArgument(format!(
            "order id must be positive, got {order_id}"
        )))
    }
}

fn validate_goods(goods_id: GoodsId) -> Result<()> {
    if goods_id.is_valid() {
        Ok(())
    } else {
        Err(InventoryError::InvalidArgument(format!(
            "goods id must be positive, got {goods_id}"
        )))
    }
}

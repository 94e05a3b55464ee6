use async_trait::async_trait;
use common::{GoodsId, OrderId};

use crate::Result;
use crate::model::{ReservationRecord, ReserveItem, RollbackOutcome, StockLevel};

/// Core trait for stock storage.
///
/// Every mutating method is a single serializing transaction: it either
/// applies all of its writes or none of them. Implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Reads the stock row for a goods item.
    async fn get_stock(&self, goods_id: GoodsId) -> Result<Option<StockLevel>>;

    /// Reads the stock rows for several goods; unknown ids are skipped.
    async fn batch_get_stock(&self, goods_ids: &[GoodsId]) -> Result<Vec<StockLevel>>;

    /// Creates or overwrites the available count of a goods item,
    /// keeping its reserved count.
    async fn set_stock(&self, goods_id: GoodsId, available: i64) -> Result<StockLevel>;

    /// Check-and-decrement for every item, writing one `Reserved` ledger
    /// entry per item.
    ///
    /// Fails with `Understock`, `NotFound` or `DuplicateReservation` without
    /// changing anything. Returns the new levels in `items` order.
    async fn reserve(&self, order_id: OrderId, items: &[ReserveItem]) -> Result<Vec<StockLevel>>;

    /// Returns the reserved quantity of `(order_id, goods_id)` to `available`
    /// and flips the ledger entry to `RolledBack`.
    ///
    /// Without a `Reserved` entry this is a no-op returning
    /// [`RollbackOutcome::NotReserved`].
    async fn rollback(&self, order_id: OrderId, goods_id: GoodsId) -> Result<RollbackOutcome>;

    /// Reads a ledger entry.
    async fn get_reservation(
        &self,
        order_id: OrderId,
        goods_id: GoodsId,
    ) -> Result<Option<ReservationRecord>>;
}

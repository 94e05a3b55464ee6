use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{GoodsId, OrderId};
use tokio::sync::Mutex;

use crate::model::{ReservationRecord, ReservationStatus, ReserveItem, RollbackOutcome, StockLevel};
use crate::store::StockStore;
use crate::{InventoryError, Result};

#[derive(Default)]
struct Tables {
    stocks: HashMap<GoodsId, StockLevel>,
    records: HashMap<(OrderId, GoodsId), ReservationRecord>,
}

/// In-memory stock store for testing and single-process runs.
///
/// One mutex guards both tables, so every method behaves as a serializable
/// transaction.
#[derive(Clone, Default)]
pub struct InMemoryStockStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of ledger entries.
    pub async fn record_count(&self) -> usize {
        self.tables.lock().await.records.len()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn get_stock(&self, goods_id: GoodsId) -> Result<Option<StockLevel>> {
        Ok(self.tables.lock().await.stocks.get(&goods_id).copied())
    }

    async fn batch_get_stock(&self, goods_ids: &[GoodsId]) -> Result<Vec<StockLevel>> {
        let tables = self.tables.lock().await;
        Ok(goods_ids
            .iter()
            .filter_map(|id| tables.stocks.get(id).copied())
            .collect())
    }

    async fn set_stock(&self, goods_id: GoodsId, available: i64) -> Result<StockLevel> {
        let mut tables = self.tables.lock().await;
        let level = tables
            .stocks
            .entry(goods_id)
            .or_insert_with(|| StockLevel::new(goods_id, 0, 0));
        level.available = available;
        Ok(*level)
    }

    async fn reserve(&self, order_id: OrderId, items: &[ReserveItem]) -> Result<Vec<StockLevel>> {
        let mut tables = self.tables.lock().await;

        // Validate everything before touching anything.
        for item in items {
            let level = tables
                .stocks
                .get(&item.goods_id)
                .ok_or(InventoryError::NotFound(item.goods_id))?;
            if tables.records.contains_key(&(order_id, item.goods_id)) {
                return Err(InventoryError::DuplicateReservation {
                    order_id,
                    goods_id: item.goods_id,
                });
            }
            if level.available < item.quantity {
                return Err(InventoryError::Understock {
                    goods_id: item.goods_id,
                    available: level.available,
                    requested: item.quantity,
                });
            }
        }

        let now = Utc::now();
        let mut levels = Vec::with_capacity(items.len());
        for item in items {
            if let Some(level) = tables.stocks.get_mut(&item.goods_id) {
                level.available -= item.quantity;
                level.reserved += item.quantity;
                levels.push(*level);
            }
            tables.records.insert(
                (order_id, item.goods_id),
                ReservationRecord {
                    order_id,
                    goods_id: item.goods_id,
                    quantity: item.quantity,
                    status: ReservationStatus::Reserved,
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Ok(levels)
    }

    async fn rollback(&self, order_id: OrderId, goods_id: GoodsId) -> Result<RollbackOutcome> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;

        let Some(record) = tables
            .records
            .get_mut(&(order_id, goods_id))
            .filter(|r| r.status == ReservationStatus::Reserved)
        else {
            return Ok(RollbackOutcome::NotReserved);
        };

        let level = tables
            .stocks
            .get_mut(&goods_id)
            .ok_or(InventoryError::NotFound(goods_id))?;
        if level.reserved < record.quantity {
            return Err(InventoryError::InvariantViolation {
                goods_id,
                reserved: level.reserved,
                quantity: record.quantity,
            });
        }

        level.available += record.quantity;
        level.reserved -= record.quantity;
        record.status = ReservationStatus::RolledBack;
        record.updated_at = Utc::now();

        Ok(RollbackOutcome::Restored {
            record: record.clone(),
            level: *level,
        })
    }

    async fn get_reservation(
        &self,
        order_id: OrderId,
        goods_id: GoodsId,
    ) -> Result<Option<ReservationRecord>> {
        Ok(self
            .tables
            .lock()
            .await
            .records
            .get(&(order_id, goods_id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOODS: GoodsId = GoodsId::new(5);

    async fn store_with(available: i64) -> InMemoryStockStore {
        let store = InMemoryStockStore::new();
        store.set_stock(GOODS, available).await.unwrap();
        store
    }

    #[tokio::test]
    async fn reserve_moves_available_to_reserved_and_writes_ledger() {
        let store = store_with(10).await;
        let order = OrderId::new(1);

        let levels = store
            .reserve(order, &[ReserveItem::new(GOODS, 3)])
            .await
            .unwrap();
        assert_eq!(levels, vec![StockLevel::new(GOODS, 7, 3)]);

        let record = store.get_reservation(order, GOODS).await.unwrap().unwrap();
        assert_eq!(record.quantity, 3);
        assert_eq!(record.status, ReservationStatus::Reserved);
    }

    #[tokio::test]
    async fn understock_changes_nothing() {
        let store = store_with(2).await;
        let result = store
            .reserve(OrderId::new(1), &[ReserveItem::new(GOODS, 3)])
            .await;

        assert!(matches!(
            result,
            Err(InventoryError::Understock {
                available: 2,
                requested: 3,
                ..
            })
        ));
        assert_eq!(
            store.get_stock(GOODS).await.unwrap(),
            Some(StockLevel::new(GOODS, 2, 0))
        );
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn multi_item_reserve_is_all_or_nothing() {
        let store = store_with(10).await;
        let other = GoodsId::new(6);
        store.set_stock(other, 1).await.unwrap();

        let result = store
            .reserve(
                OrderId::new(1),
                &[ReserveItem::new(GOODS, 4), ReserveItem::new(other, 2)],
            )
            .await;

        assert!(matches!(result, Err(InventoryError::Understock { .. })));
        assert_eq!(store.get_stock(GOODS).await.unwrap().unwrap().available, 10);
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_goods_is_not_found() {
        let store = InMemoryStockStore::new();
        let result = store
            .reserve(OrderId::new(1), &[ReserveItem::new(GOODS, 1)])
            .await;
        assert!(matches!(result, Err(InventoryError::NotFound(id)) if id == GOODS));
    }

    #[tokio::test]
    async fn second_reservation_for_same_order_is_rejected() {
        let store = store_with(10).await;
        let order = OrderId::new(1);
        store
            .reserve(order, &[ReserveItem::new(GOODS, 1)])
            .await
            .unwrap();

        let result = store.reserve(order, &[ReserveItem::new(GOODS, 1)]).await;
        assert!(matches!(
            result,
            Err(InventoryError::DuplicateReservation { .. })
        ));
        assert_eq!(store.get_stock(GOODS).await.unwrap().unwrap().available, 9);
    }

    #[tokio::test]
    async fn rollback_restores_once() {
        let store = store_with(10).await;
        let order = OrderId::new(1);
        store
            .reserve(order, &[ReserveItem::new(GOODS, 3)])
            .await
            .unwrap();

        let first = store.rollback(order, GOODS).await.unwrap();
        assert!(first.is_restored());
        let second = store.rollback(order, GOODS).await.unwrap();
        assert_eq!(second, RollbackOutcome::NotReserved);

        assert_eq!(
            store.get_stock(GOODS).await.unwrap(),
            Some(StockLevel::new(GOODS, 10, 0))
        );
        let record = store.get_reservation(order, GOODS).await.unwrap().unwrap();
        assert_eq!(record.status, ReservationStatus::RolledBack);
    }

    #[tokio::test]
    async fn rollback_without_reservation_is_noop() {
        let store = store_with(10).await;
        let outcome = store.rollback(OrderId::new(99), GOODS).await.unwrap();
        assert_eq!(outcome, RollbackOutcome::NotReserved);
        assert_eq!(store.get_stock(GOODS).await.unwrap().unwrap().available, 10);
    }

    #[tokio::test]
    async fn rollback_refuses_to_drive_reserved_negative() {
        let store = store_with(10).await;
        let order = OrderId::new(1);
        store
            .reserve(order, &[ReserveItem::new(GOODS, 3)])
            .await
            .unwrap();
        // Simulate a corrupted row: reserved lost its hold.
        store.tables.lock().await.stocks.get_mut(&GOODS).unwrap().reserved = 1;

        let result = store.rollback(order, GOODS).await;
        assert!(matches!(
            result,
            Err(InventoryError::InvariantViolation {
                reserved: 1,
                quantity: 3,
                ..
            })
        ));
        let record = store.get_reservation(order, GOODS).await.unwrap().unwrap();
        assert_eq!(record.status, ReservationStatus::Reserved);
    }

    #[tokio::test]
    async fn set_stock_keeps_reserved() {
        let store = store_with(10).await;
        store
            .reserve(OrderId::new(1), &[ReserveItem::new(GOODS, 4)])
            .await
            .unwrap();
        let level = store.set_stock(GOODS, 50).await.unwrap();
        assert_eq!(level, StockLevel::new(GOODS, 50, 4));
    }
}

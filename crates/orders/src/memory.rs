use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::OrderId;
use tokio::sync::RwLock;

use crate::store::{OrderStore, check_line_item, check_transition};
use crate::{Order, OrderLineItem, OrderStatus, OrderStoreError, Result};

#[derive(Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    line_items: HashMap<OrderId, Vec<OrderLineItem>>,
}

/// In-memory order store for testing and development.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    /// Creates a new empty order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every read fail with a database error, for testing.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every write fail with a database error, for testing.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn len(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns true if no orders are stored.
    pub async fn is_empty(&self) -> bool {
        self.tables.read().await.orders.is_empty()
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(OrderStoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OrderStoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order, line_item: &OrderLineItem) -> Result<()> {
        self.check_writes()?;
        check_line_item(order, line_item)?;

        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.order_id) {
            return Err(OrderStoreError::AlreadyExists(order.order_id));
        }
        tables.orders.insert(order.order_id, order.clone());
        tables
            .line_items
            .insert(order.order_id, vec![line_item.clone()]);
        Ok(())
    }

    async fn find(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.check_reads()?;
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn line_items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>> {
        self.check_reads()?;
        Ok(self
            .tables
            .read()
            .await
            .line_items
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn transition(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        check_transition(from, to)?;
        self.check_writes()?;

        let mut tables = self.tables.write().await;
        match tables.orders.get_mut(&order_id) {
            Some(order) if order.status == from => {
                order.status = to;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReceiverInfo;
    use common::{GoodsId, UserId};

    fn sample(order_id: i64) -> (Order, OrderLineItem) {
        let order_id = OrderId::new(order_id);
        let user = UserId::new(9);
        (
            Order::pending(order_id, user, 1_500, ReceiverInfo::default()),
            OrderLineItem::new(order_id, GoodsId::new(3), user, 2),
        )
    }

    #[tokio::test]
    async fn create_and_find() {
        let store = InMemoryOrderStore::new();
        let (order, item) = sample(1);
        store.create(&order, &item).await.unwrap();

        let found = store.find(order.order_id).await.unwrap().unwrap();
        assert_eq!(found, order);
        assert_eq!(store.line_items(order.order_id).await.unwrap(), vec![item]);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = InMemoryOrderStore::new();
        let (order, item) = sample(1);
        store.create(&order, &item).await.unwrap();

        let result = store.create(&order, &item).await;
        assert!(matches!(result, Err(OrderStoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn mismatched_line_item_writes_nothing() {
        let store = InMemoryOrderStore::new();
        let (order, _) = sample(1);
        let (_, other_item) = sample(2);

        let result = store.create(&order, &other_item).await;
        assert!(matches!(
            result,
            Err(OrderStoreError::LineItemMismatch { .. })
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn close_if_pending_only_closes_once() {
        let store = InMemoryOrderStore::new();
        let (order, item) = sample(1);
        store.create(&order, &item).await.unwrap();

        assert!(store.close_if_pending(order.order_id).await.unwrap());
        assert!(!store.close_if_pending(order.order_id).await.unwrap());
        assert_eq!(
            store.find(order.order_id).await.unwrap().unwrap().status,
            OrderStatus::Closed
        );
    }

    #[tokio::test]
    async fn paid_order_is_not_closed() {
        let store = InMemoryOrderStore::new();
        let (order, item) = sample(1);
        store.create(&order, &item).await.unwrap();
        store
            .transition(order.order_id, OrderStatus::PendingPayment, OrderStatus::Paid)
            .await
            .unwrap();

        assert!(!store.close_if_pending(order.order_id).await.unwrap());
        assert_eq!(
            store.find(order.order_id).await.unwrap().unwrap().status,
            OrderStatus::Paid
        );
    }

    #[tokio::test]
    async fn missing_order_is_not_transitioned() {
        let store = InMemoryOrderStore::new();
        assert!(!store.close_if_pending(OrderId::new(5)).await.unwrap());
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let store = InMemoryOrderStore::new();
        let result = store
            .transition(OrderId::new(1), OrderStatus::Closed, OrderStatus::Paid)
            .await;
        assert!(matches!(
            result,
            Err(OrderStoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn injected_failures_surface_as_database_errors() {
        let store = InMemoryOrderStore::new();
        let (order, item) = sample(1);

        store.set_fail_writes(true);
        assert!(matches!(
            store.create(&order, &item).await,
            Err(OrderStoreError::Database(_))
        ));
        store.set_fail_writes(false);
        store.create(&order, &item).await.unwrap();

        store.set_fail_reads(true);
        assert!(matches!(
            store.find(order.order_id).await,
            Err(OrderStoreError::Database(_))
        ));
    }
}

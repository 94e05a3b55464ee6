use async_trait::async_trait;
use common::OrderId;

use crate::{Order, OrderLineItem, OrderStatus, OrderStoreError, Result};

/// Core trait for order storage.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists an order together with its line item, atomically.
    ///
    /// Fails with [`OrderStoreError::AlreadyExists`] if the order id is taken.
    async fn create(&self, order: &Order, line_item: &OrderLineItem) -> Result<()>;

    /// Reads an order by id.
    async fn find(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Reads the line items of an order.
    async fn line_items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>>;

    /// Moves an order from `from` to `to` only if it is currently `from`.
    ///
    /// Returns false when the order is missing or in another status.
    async fn transition(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool>;

    /// Closes an order that is still awaiting payment.
    async fn close_if_pending(&self, order_id: OrderId) -> Result<bool> {
        self.transition(order_id, OrderStatus::PendingPayment, OrderStatus::Closed)
            .await
    }
}

/// Rejects transitions outside the order lifecycle.
pub(crate) fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(OrderStoreError::InvalidTransition { from, to })
    }
}

/// Rejects a line item that points at another order.
pub(crate) fn check_line_item(order: &Order, line_item: &OrderLineItem) -> Result<()> {
    if order.order_id == line_item.order_id {
        Ok(())
    } else {
        Err(OrderStoreError::LineItemMismatch {
            order: order.order_id,
            item: line_item.order_id,
        })
    }
}

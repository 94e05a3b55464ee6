//! Message handlers that undo reservations.
//!
//! Both handlers may see the same message more than once and rely on the
//! reservation ledger and the order status check for idempotency.

use std::sync::Arc;

use async_trait::async_trait;
use broker::{ConsumeResult, Message, MessageHandler, Producer};
use common::{STOCK_ROLLBACK_TOPIC, StockChange};
use inventory::{InventoryError, ReservationEngine};
use orders::{OrderStatus, OrderStore};

/// Consumer group of the stock service.
pub const STOCK_SERVICE_GROUP: &str = "stock-service";

/// Consumer group of the order service.
pub const ORDER_SERVICE_GROUP: &str = "order-service";

/// Releases the reservation named by a stock-rollback message.
#[derive(Clone)]
pub struct StockRollbackHandler {
    engine: ReservationEngine,
}

impl StockRollbackHandler {
    pub fn new(engine: ReservationEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl MessageHandler for StockRollbackHandler {
    #[tracing::instrument(skip(self, msg), fields(message_id = %msg.id, reconsume_times = msg.reconsume_times))]
    async fn consume(&self, msg: &Message) -> ConsumeResult {
        let change: StockChange = match msg.decode() {
            Ok(change) => change,
            Err(e) => {
                tracing::error!(error = %e, "dropping undecodable stock-rollback message");
                return ConsumeResult::Success;
            }
        };

        match self
            .engine
            .rollback(change.order_id, change.goods_id, change.num)
            .await
        {
            Ok(_) => ConsumeResult::Success,
            Err(e) if e.is_transient() => {
                tracing::warn!(order_id = %change.order_id, error = %e, "rollback failed, retrying later");
                ConsumeResult::RetryLater
            }
            Err(e @ InventoryError::InvariantViolation { .. }) => {
                // Retrying cannot repair the counts.
                tracing::error!(order_id = %change.order_id, error = %e, "rollback rejected");
                ConsumeResult::Success
            }
            Err(e) => {
                tracing::error!(order_id = %change.order_id, error = %e, "dropping stock-rollback message");
                ConsumeResult::Success
            }
        }
    }
}

/// Closes unpaid orders when their payment timeout fires and triggers the
/// stock rollback.
#[derive(Clone)]
pub struct PaymentTimeoutHandler {
    orders: Arc<dyn OrderStore>,
    producer: Arc<dyn Producer>,
}

impl PaymentTimeoutHandler {
    pub fn new(orders: Arc<dyn OrderStore>, producer: Arc<dyn Producer>) -> Self {
        Self { orders, producer }
    }
}

#[async_trait]
impl MessageHandler for PaymentTimeoutHandler {
    #[tracing::instrument(skip(self, msg), fields(message_id = %msg.id, reconsume_times = msg.reconsume_times))]
    async fn consume(&self, msg: &Message) -> ConsumeResult {
        let change: StockChange = match msg.decode() {
            Ok(change) => change,
            Err(e) => {
                tracing::error!(error = %e, "dropping undecodable payment-timeout message");
                return ConsumeResult::Success;
            }
        };
        let order_id = change.order_id;

        let order = match self.orders.find(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                tracing::warn!(%order_id, "payment timeout for unknown order");
                return ConsumeResult::Success;
            }
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "order lookup failed, retrying later");
                return ConsumeResult::RetryLater;
            }
        };
        if order.status != OrderStatus::PendingPayment {
            tracing::debug!(%order_id, status = %order.status, "order no longer pending");
            return ConsumeResult::Success;
        }

        // Publish before closing: if closing fails the redelivery publishes
        // again, and rollback is idempotent.
        let rollback = match Message::json(STOCK_ROLLBACK_TOPIC, &change) {
            Ok(rollback) => rollback,
            Err(e) => {
                tracing::error!(%order_id, error = %e, "failed to encode stock rollback");
                return ConsumeResult::RetryLater;
            }
        };
        if let Err(e) = self.producer.send(rollback).await {
            tracing::warn!(%order_id, error = %e, "stock rollback publish failed, retrying later");
            return ConsumeResult::RetryLater;
        }

        match self.orders.close_if_pending(order_id).await {
            Ok(true) => {
                metrics::counter!("order_timeouts_closed_total").increment(1);
                tracing::info!(%order_id, "unpaid order closed");
                ConsumeResult::Success
            }
            Ok(false) => {
                tracing::info!(%order_id, "order left pending state before it could be closed");
                ConsumeResult::Success
            }
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "order close failed, retrying later");
                ConsumeResult::RetryLater
            }
        }
    }
}

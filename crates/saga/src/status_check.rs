//! Answers broker status checks for stock-rollback half messages.

use std::sync::Arc;

use async_trait::async_trait;
use broker::{DelayLevel, LocalTxState, Message, Producer, TransactionListener};
use common::{PAYMENT_TIMEOUT_TOPIC, StockChange};
use orders::{OrderStatus, OrderStore};

/// Decides the fate of a stock-rollback half message from the order store.
///
/// | order                 | answer                                   |
/// |-----------------------|------------------------------------------|
/// | missing               | `Commit`                                 |
/// | `Closed`              | `Commit`                                 |
/// | `PendingPayment`      | `Discard` once the timeout is scheduled  |
/// | `Paid`                | `Discard`                                |
/// | lookup or send failed | `Unknown`                                |
///
/// A pending order may have been persisted by a local transaction that was
/// cut off before it scheduled its payment timeout, so the timeout is sent
/// again before the rollback is withdrawn. The timeout handler ignores
/// orders that are no longer pending.
#[derive(Clone)]
pub struct OrderStatusCheck {
    orders: Arc<dyn OrderStore>,
    producer: Arc<dyn Producer>,
    payment_timeout_delay: DelayLevel,
}

impl OrderStatusCheck {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        producer: Arc<dyn Producer>,
        payment_timeout_delay: DelayLevel,
    ) -> Self {
        Self {
            orders,
            producer,
            payment_timeout_delay,
        }
    }

    /// Checks the order named by `change`.
    pub async fn check(&self, change: &StockChange) -> LocalTxState {
        let order_id = change.order_id;
        let tx_state = match self.orders.find(order_id).await {
            // Nothing persisted: release whatever may have been reserved.
            Ok(None) => LocalTxState::Commit,
            Ok(Some(order)) => match order.status {
                // Closed already means compensated; another rollback is harmless.
                OrderStatus::Closed => LocalTxState::Commit,
                OrderStatus::PendingPayment => self.reschedule_timeout(change).await,
                OrderStatus::Paid => LocalTxState::Discard,
            },
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "order lookup failed during status check");
                LocalTxState::Unknown
            }
        };

        tracing::info!(%order_id, state = %tx_state, "local transaction checked");
        tx_state
    }

    async fn reschedule_timeout(&self, change: &StockChange) -> LocalTxState {
        let sent = match Message::json(PAYMENT_TIMEOUT_TOPIC, change) {
            Ok(msg) => self.producer.send(msg.with_delay(self.payment_timeout_delay)).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(_) => {
                tracing::debug!(order_id = %change.order_id, "payment timeout rescheduled");
                LocalTxState::Discard
            }
            Err(e) => {
                tracing::warn!(
                    order_id = %change.order_id,
                    error = %e,
                    "failed to reschedule payment timeout, asking again later"
                );
                LocalTxState::Unknown
            }
        }
    }
}

/// Registered with the broker for half messages recovered after a restart,
/// which no longer have the listener that sent them.
#[async_trait]
impl TransactionListener for OrderStatusCheck {
    async fn execute_local(&self, msg: &Message) -> LocalTxState {
        tracing::warn!(message_id = %msg.id, "status checker cannot run a local transaction");
        LocalTxState::Unknown
    }

    #[tracing::instrument(skip(self, msg), fields(message_id = %msg.id))]
    async fn check_local(&self, msg: &Message) -> LocalTxState {
        match msg.decode::<StockChange>() {
            Ok(change) => self.check(&change).await,
            Err(e) => {
                // The rollback consumer could not decode it either.
                tracing::error!(error = %e, "undecodable half message, discarding");
                LocalTxState::Discard
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use broker::{BrokerError, InMemoryBroker, SendReceipt};
    use common::{GoodsId, OrderId, UserId};
    use orders::{InMemoryOrderStore, Order, OrderLineItem, ReceiverInfo};

    use super::*;

    struct FailingProducer;

    #[async_trait]
    impl Producer for FailingProducer {
        async fn send(&self, _msg: Message) -> broker::Result<SendReceipt> {
            Err(BrokerError::Closed)
        }
    }

    fn change() -> StockChange {
        StockChange::new(OrderId::new(77), GoodsId::new(5), 2)
    }

    async fn store_with(status: OrderStatus) -> InMemoryOrderStore {
        let store = InMemoryOrderStore::new();
        let order = Order::pending(OrderId::new(77), UserId::new(42), 2_598, ReceiverInfo::default());
        let item = OrderLineItem::new(OrderId::new(77), GoodsId::new(5), UserId::new(42), 2);
        store.create(&order, &item).await.unwrap();
        if status != OrderStatus::PendingPayment {
            assert!(
                store
                    .transition(OrderId::new(77), OrderStatus::PendingPayment, status)
                    .await
                    .unwrap()
            );
        }
        store
    }

    fn check_with(orders: InMemoryOrderStore, producer: Arc<dyn Producer>) -> OrderStatusCheck {
        OrderStatusCheck::new(Arc::new(orders), producer, DelayLevel::TEN_SECONDS)
    }

    #[tokio::test]
    async fn missing_order_commits_rollback() {
        let broker = InMemoryBroker::new();
        let check = check_with(InMemoryOrderStore::new(), Arc::new(broker.clone()));

        assert_eq!(check.check(&change()).await, LocalTxState::Commit);
        assert_eq!(broker.scheduled_count(PAYMENT_TIMEOUT_TOPIC).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_order_gets_a_fresh_payment_timeout() {
        let broker = InMemoryBroker::new();
        let check = check_with(
            store_with(OrderStatus::PendingPayment).await,
            Arc::new(broker.clone()),
        );

        assert_eq!(check.check(&change()).await, LocalTxState::Discard);
        assert_eq!(broker.scheduled_count(PAYMENT_TIMEOUT_TOPIC).await, 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        let due = broker.published(PAYMENT_TIMEOUT_TOPIC).await;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].decode::<StockChange>().unwrap(), change());
    }

    #[tokio::test]
    async fn pending_order_stays_unknown_when_timeout_cannot_be_sent() {
        let check = check_with(
            store_with(OrderStatus::PendingPayment).await,
            Arc::new(FailingProducer),
        );

        assert_eq!(check.check(&change()).await, LocalTxState::Unknown);
    }

    #[tokio::test]
    async fn paid_order_discards_without_rescheduling() {
        let broker = InMemoryBroker::new();
        let check = check_with(store_with(OrderStatus::Paid).await, Arc::new(broker.clone()));

        assert_eq!(check.check(&change()).await, LocalTxState::Discard);
        assert_eq!(broker.scheduled_count(PAYMENT_TIMEOUT_TOPIC).await, 0);
    }

    #[tokio::test]
    async fn closed_order_commits_rollback() {
        let broker = InMemoryBroker::new();
        let check = check_with(store_with(OrderStatus::Closed).await, Arc::new(broker));

        assert_eq!(check.check(&change()).await, LocalTxState::Commit);
    }

    #[tokio::test]
    async fn undecodable_half_message_is_discarded() {
        let check = check_with(InMemoryOrderStore::new(), Arc::new(InMemoryBroker::new()));
        let msg = Message::new(common::STOCK_ROLLBACK_TOPIC, "not json");

        assert_eq!(check.check_local(&msg).await, LocalTxState::Discard);
    }
}

//! Order saga coordinator.

use std::sync::Arc;

use broker::{DelayLevel, LocalTxState, Message, Producer, TransactionProducer};
use common::{GoodsId, IdGenerator, OrderId, STOCK_ROLLBACK_TOPIC, StockChange, UserId};
use orders::{OrderStore, ReceiverInfo};

use crate::error::{Result, SagaError};
use crate::services::{CatalogClient, StockClient};
use crate::state::SagaState;
use crate::transaction::{OrderTransaction, SagaServices};

/// A request to place a single-goods order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderRequest {
    pub user_id: UserId,
    pub goods_id: GoodsId,
    pub quantity: i64,
    pub receiver: ReceiverInfo,
}

impl CreateOrderRequest {
    fn validate(&self) -> Result<()> {
        if !self.user_id.is_valid() {
            return Err(SagaError::InvalidArgument(format!(
                "user id must be positive, got {}",
                self.user_id
            )));
        }
        if !self.goods_id.is_valid() {
            return Err(SagaError::InvalidArgument(format!(
                "goods id must be positive, got {}",
                self.goods_id
            )));
        }
        if self.quantity <= 0 {
            return Err(SagaError::InvalidArgument(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        Ok(())
    }
}

/// Tunables for the saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SagaConfig {
    /// Delay tier of the payment-timeout message.
    pub payment_timeout_delay: DelayLevel,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            payment_timeout_delay: DelayLevel::TEN_SECONDS,
        }
    }
}

/// Creates orders through a transactional half message.
///
/// The half message is a stock rollback trigger for the new order. It is
/// discarded when the local transaction persists the order, and committed
/// (delivered to the stock service) otherwise.
pub struct OrderSagaCoordinator {
    ids: Arc<IdGenerator>,
    tx_producer: Arc<dyn TransactionProducer>,
    services: SagaServices,
}

impl OrderSagaCoordinator {
    /// Creates a new saga coordinator.
    pub fn new(
        ids: Arc<IdGenerator>,
        tx_producer: Arc<dyn TransactionProducer>,
        producer: Arc<dyn Producer>,
        catalog: Arc<dyn CatalogClient>,
        stock: Arc<dyn StockClient>,
        orders: Arc<dyn OrderStore>,
        config: SagaConfig,
    ) -> Self {
        Self {
            ids,
            tx_producer,
            services: SagaServices {
                catalog,
                stock,
                orders,
                producer,
                payment_timeout_delay: config.payment_timeout_delay,
            },
        }
    }

    /// Places an order and returns its id.
    ///
    /// Succeeds only when the broker discarded the rollback trigger and the
    /// local transaction recorded no failure.
    #[tracing::instrument(
        skip(self, request),
        fields(user_id = %request.user_id, goods_id = %request.goods_id, quantity = request.quantity)
    )]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderId> {
        request.validate()?;

        let order_id = self.ids.next_order_id();
        let half = Message::json(
            STOCK_ROLLBACK_TOPIC,
            &StockChange::new(order_id, request.goods_id, request.quantity),
        )?;
        let transaction = Arc::new(OrderTransaction::new(
            order_id,
            request,
            self.services.clone(),
        ));

        let sent = match self
            .tx_producer
            .send_in_transaction(half, transaction.clone())
            .await
        {
            Ok(sent) => sent,
            Err(e) => {
                metrics::counter!("orders_failed_total").increment(1);
                tracing::error!(%order_id, error = %e, "half message send failed");
                return Err(e.into());
            }
        };

        let failure = transaction.failure();
        match (sent.state, failure) {
            (LocalTxState::Discard, None) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(%order_id, "order created");
                Ok(order_id)
            }
            (state, failure) => {
                metrics::counter!("orders_failed_total").increment(1);
                let reason = failure.unwrap_or_else(|| match state {
                    LocalTxState::Unknown => {
                        "local transaction outcome unknown, awaiting status check".to_string()
                    }
                    _ => format!("half message resolved as {state}"),
                });
                tracing::warn!(
                    %order_id,
                    saga_state = %SagaState::from_resolution(state),
                    %reason,
                    "order creation failed"
                );
                Err(SagaError::OrderCreationFailed { order_id, reason })
            }
        }
    }
}

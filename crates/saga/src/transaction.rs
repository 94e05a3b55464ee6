//! The local transaction behind one half message.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use broker::{DelayLevel, LocalTxState, Message, Producer, TransactionListener};
use common::{OrderId, PAYMENT_TIMEOUT_TOPIC, StockChange};
use orders::{Order, OrderLineItem, OrderStore};

use crate::coordinator::CreateOrderRequest;
use crate::error::{Result, SagaError};
use crate::services::{CatalogClient, StockClient};
use crate::state::SagaState;
use crate::status_check::OrderStatusCheck;

/// Collaborators shared by every order transaction.
#[derive(Clone)]
pub(crate) struct SagaServices {
    pub catalog: Arc<dyn CatalogClient>,
    pub stock: Arc<dyn StockClient>,
    pub orders: Arc<dyn OrderStore>,
    pub producer: Arc<dyn Producer>,
    pub payment_timeout_delay: DelayLevel,
}

/// Transaction listener for one `CreateOrder` call.
///
/// The broker calls [`TransactionListener::execute_local`] once and may call
/// [`TransactionListener::check_local`] later if that gave no answer. The
/// Status checks are answered by [`OrderStatusCheck`]. The
/// listener remembers why the local transaction failed so the caller can
/// report it.
pub struct OrderTransaction {
    order_id: OrderId,
    request: CreateOrderRequest,
    services: SagaServices,
    state: Mutex<SagaState>,
    failure: Mutex<Option<String>>,
}

impl OrderTransaction {
    pub(crate) fn new(
        order_id: OrderId,
        request: CreateOrderRequest,
        services: SagaServices,
    ) -> Self {
        Self {
            order_id,
            request,
            services,
            state: Mutex::new(SagaState::Initiated),
            failure: Mutex::new(None),
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Current saga state.
    pub fn state(&self) -> SagaState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Why the local transaction failed, if it did.
    pub fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub(crate) fn transition(&self, next: SagaState) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.can_transition_to(next) {
            tracing::debug!(order_id = %self.order_id, from = %*state, to = %next, "saga transition");
            *state = next;
        }
    }

    fn status_check(&self) -> OrderStatusCheck {
        OrderStatusCheck::new(
            self.services.orders.clone(),
            self.services.producer.clone(),
            self.services.payment_timeout_delay,
        )
    }

    fn record_failure(&self, reason: String) {
        *self.failure.lock().unwrap_or_else(|p| p.into_inner()) = Some(reason);
    }

    async fn run_local(&self) -> Result<()> {
        let req = &self.request;
        let services = &self.services;

        let unit_price = services.catalog.unit_price(req.goods_id, req.user_id).await?;

        services
            .stock
            .reserve(req.goods_id, req.quantity, self.order_id)
            .await?;

        // From here on a failure leaves reserved stock behind; committing the
        // half message releases it.
        let pay_amount = unit_price.checked_mul(req.quantity).ok_or_else(|| {
            SagaError::InvalidArgument(format!(
                "pay amount overflows for price {unit_price} x {}",
                req.quantity
            ))
        })?;
        let order = Order::pending(self.order_id, req.user_id, pay_amount, req.receiver.clone());
        let line_item = OrderLineItem::new(self.order_id, req.goods_id, req.user_id, req.quantity);
        services.orders.create(&order, &line_item).await?;

        let timeout = Message::json(
            PAYMENT_TIMEOUT_TOPIC,
            &StockChange::new(self.order_id, req.goods_id, req.quantity),
        )?
        .with_delay(services.payment_timeout_delay);
        if let Err(e) = services.producer.send(timeout).await {
            // Without a timeout scheduled nothing would ever close the order.
            if let Err(close_err) = services.orders.close_if_pending(self.order_id).await {
                tracing::error!(
                    order_id = %self.order_id,
                    error = %close_err,
                    "failed to close order after timeout publish failure"
                );
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionListener for OrderTransaction {
    #[tracing::instrument(skip(self, _msg), fields(order_id = %self.order_id))]
    async fn execute_local(&self, _msg: &Message) -> LocalTxState {
        self.transition(SagaState::LocalTxRunning);
        let started = Instant::now();

        let tx_state = match self.run_local().await {
            Ok(()) => LocalTxState::Discard,
            Err(e) => {
                tracing::warn!(error = %e, "local transaction failed, committing rollback trigger");
                self.record_failure(e.to_string());
                LocalTxState::Commit
            }
        };

        metrics::histogram!("saga_local_tx_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        self.transition(SagaState::from_resolution(tx_state));
        tx_state
    }

    #[tracing::instrument(skip(self, msg), fields(message_id = %msg.id))]
    async fn check_local(&self, msg: &Message) -> LocalTxState {
        let change = match msg.decode::<StockChange>() {
            Ok(change) => change,
            Err(e) => {
                tracing::error!(error = %e, "undecodable half message, using listener request");
                StockChange::new(self.order_id, self.request.goods_id, self.request.quantity)
            }
        };

        let tx_state = self.status_check().check(&change).await;
        self.transition(SagaState::from_resolution(tx_state));
        tx_state
    }
}

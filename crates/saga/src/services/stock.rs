//! Stock client trait and its in-process implementation.

use async_trait::async_trait;
use common::{GoodsId, OrderId};
use inventory::ReservationEngine;

use crate::error::SagaError;

/// Reservation call used by the local transaction.
#[async_trait]
pub trait StockClient: Send + Sync {
    /// Reserves `quantity` units of `goods_id` for `order_id`.
    async fn reserve(
        &self,
        goods_id: GoodsId,
        quantity: i64,
        order_id: OrderId,
    ) -> Result<(), SagaError>;
}

#[async_trait]
impl StockClient for ReservationEngine {
    async fn reserve(
        &self,
        goods_id: GoodsId,
        quantity: i64,
        order_id: OrderId,
    ) -> Result<(), SagaError> {
        ReservationEngine::reserve(self, goods_id, quantity, order_id).await?;
        Ok(())
    }
}

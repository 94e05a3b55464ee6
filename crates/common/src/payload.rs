//! Message payloads shared by the order and stock services.

use serde::{Deserialize, Serialize};

use crate::{GoodsId, OrderId};

/// Topic carrying stock rollback triggers, consumed by the stock service.
pub const STOCK_ROLLBACK_TOPIC: &str = "stock-rollback";

/// Topic carrying delayed payment-timeout checks, consumed by the order service.
pub const PAYMENT_TIMEOUT_TOPIC: &str = "payment-timeout";

/// `{orderId, goodsId, num}`, the body of both saga topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChange {
    pub order_id: OrderId,
    pub goods_id: GoodsId,
    pub num: i64,
}

impl StockChange {
    pub fn new(order_id: OrderId, goods_id: GoodsId, num: i64) -> Self {
        Self {
            order_id,
            goods_id,
            num,
        }
    }

    /// Encodes the payload as a JSON message body.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a JSON message body.
    pub fn from_bytes(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

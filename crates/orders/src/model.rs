use chrono::{DateTime, Utc};
use common::{GoodsId, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::OrderStatus;

/// Shipping details captured at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverInfo {
    pub address: String,
    pub name: String,
    pub phone: String,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    /// Amount due, in minor currency units.
    pub pay_amount: i64,
    pub status: OrderStatus,
    pub receiver: ReceiverInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates an order awaiting payment.
    pub fn pending(
        order_id: OrderId,
        user_id: UserId,
        pay_amount: i64,
        receiver: ReceiverInfo,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            user_id,
            pay_amount,
            status: OrderStatus::PendingPayment,
            receiver,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One goods line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub order_id: OrderId,
    pub goods_id: GoodsId,
    pub user_id: UserId,
    pub quantity: i64,
}

impl OrderLineItem {
    pub fn new(order_id: OrderId, goods_id: GoodsId, user_id: UserId, quantity: i64) -> Self {
        Self {
            order_id,
            goods_id,
            user_id,
            quantity,
        }
    }
}

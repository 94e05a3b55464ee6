//! `order.Order` endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use catalog::format_price;
use chrono::{DateTime, Utc};
use common::{GoodsId, OrderId, UserId};
use orders::{Order, OrderLineItem, ReceiverInfo};
use saga::CreateOrderRequest as PlaceOrder;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub goods_id: i64,
    #[serde(default)]
    pub num: i64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOrderRequest {
    #[serde(default)]
    pub order_id: i64,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedResponse {
    pub order_id: OrderId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemResponse {
    pub goods_id: GoodsId,
    pub num: i64,
}

impl From<OrderLineItem> for LineItemResponse {
    fn from(item: OrderLineItem) -> Self {
        Self {
            goods_id: item.goods_id,
            num: item.quantity,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub pay_amount: String,
    pub status: i32,
    pub status_name: &'static str,
    pub address: String,
    pub name: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<LineItemResponse>,
}

impl OrderResponse {
    fn new(order: Order, items: Vec<OrderLineItem>) -> Self {
        Self {
            order_id: order.order_id,
            user_id: order.user_id,
            pay_amount: format_price(order.pay_amount),
            status: order.status.code(),
            status_name: order.status.as_str(),
            address: order.receiver.address,
            name: order.receiver.name,
            phone: order.receiver.phone,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items.into_iter().map(LineItemResponse::from).collect(),
        }
    }
}

// -- Handlers --

/// POST /order.Order/CreateOrder
#[tracing::instrument(skip(state, req), fields(user_id = req.user_id, goods_id = req.goods_id, quantity = req.num))]
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<OrderCreatedResponse>, ApiError> {
    let order_id = state
        .coordinator
        .create_order(PlaceOrder {
            user_id: UserId::new(req.user_id),
            goods_id: GoodsId::new(req.goods_id),
            quantity: req.num,
            receiver: ReceiverInfo {
                address: req.address,
                name: req.name,
                phone: req.phone,
            },
        })
        .await?;
    Ok(Json(OrderCreatedResponse { order_id }))
}

/// POST /order.Order/GetOrder
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GetOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = OrderId::new(req.order_id);
    if !order_id.is_valid() {
        return Err(ApiError::InvalidArgument(format!(
            "order id must be positive, got {order_id}"
        )));
    }

    let order = state
        .orders
        .find(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {order_id}")))?;
    let items = state.orders.line_items(order_id).await?;
    Ok(Json(OrderResponse::new(order, items)))
}

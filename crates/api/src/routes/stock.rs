//! `stock.Stock` endpoints.
//!
//! `num` in responses is the available (unreserved) quantity.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::{GoodsId, OrderId};
use inventory::{ReserveItem, StockLevel};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoodsRef {
    #[serde(default)]
    pub goods_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGetStockRequest {
    #[serde(default)]
    pub data: Vec<GoodsRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReduceStockRequest {
    #[serde(default)]
    pub goods_id: i64,
    #[serde(default)]
    pub num: i64,
    #[serde(default)]
    pub order_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoodsQuantity {
    #[serde(default)]
    pub goods_id: i64,
    #[serde(default)]
    pub num: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReduceStockRequest {
    #[serde(default)]
    pub order_id: i64,
    #[serde(default)]
    pub data: Vec<GoodsQuantity>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStockRequest {
    #[serde(default)]
    pub goods_id: i64,
    #[serde(default)]
    pub num: i64,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockResponse {
    pub goods_id: GoodsId,
    pub num: i64,
}

impl From<StockLevel> for StockResponse {
    fn from(level: StockLevel) -> Self {
        Self {
            goods_id: level.goods_id,
            num: level.available,
        }
    }
}

#[derive(Serialize)]
pub struct StockListResponse {
    pub data: Vec<StockResponse>,
}

#[derive(Serialize)]
pub struct Empty {}

// -- Handlers --

/// POST /stock.Stock/GetStock
pub async fn get_stock(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GoodsRef>,
) -> Result<Json<StockResponse>, ApiError> {
    let level = state.inventory.get_stock(GoodsId::new(req.goods_id)).await?;
    Ok(Json(level.into()))
}

/// POST /stock.Stock/BatchGetStock
///
/// Unknown goods are left out of the response.
pub async fn batch_get_stock(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchGetStockRequest>,
) -> Result<Json<StockListResponse>, ApiError> {
    let goods_ids: Vec<GoodsId> = req.data.iter().map(|g| GoodsId::new(g.goods_id)).collect();
    let levels = state.inventory.batch_get_stock(&goods_ids).await?;
    Ok(Json(StockListResponse {
        data: levels.into_iter().map(StockResponse::from).collect(),
    }))
}

/// POST /stock.Stock/ReduceStock
#[tracing::instrument(skip(state, req), fields(goods_id = req.goods_id, order_id = req.order_id, quantity = req.num))]
pub async fn reduce_stock(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReduceStockRequest>,
) -> Result<Json<Empty>, ApiError> {
    state
        .inventory
        .reserve(
            GoodsId::new(req.goods_id),
            req.num,
            OrderId::new(req.order_id),
        )
        .await?;
    Ok(Json(Empty {}))
}

/// POST /stock.Stock/BatchReduceStock
///
/// Reserves every line or none of them.
#[tracing::instrument(skip(state, req), fields(order_id = req.order_id, items = req.data.len()))]
pub async fn batch_reduce_stock(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchReduceStockRequest>,
) -> Result<Json<StockListResponse>, ApiError> {
    let items: Vec<ReserveItem> = req
        .data
        .iter()
        .map(|line| ReserveItem::new(GoodsId::new(line.goods_id), line.num))
        .collect();
    let levels = state
        .inventory
        .batch_reserve(OrderId::new(req.order_id), &items)
        .await?;
    Ok(Json(StockListResponse {
        data: levels.into_iter().map(StockResponse::from).collect(),
    }))
}

/// POST /stock.Stock/RollbackStock
///
/// Restocking without the lock or the ledger could double-release a
/// reservation, so this legacy call is refused. Rollbacks arrive through the
/// `stock-rollback` topic.
pub async fn rollback_stock() -> ApiError {
    ApiError::Unimplemented("RollbackStock is not supported; use the stock-rollback topic".to_string())
}

/// POST /stock.Stock/SetStock
#[tracing::instrument(skip(state, req), fields(goods_id = req.goods_id, available = req.num))]
pub async fn set_stock(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<Empty>, ApiError> {
    state
        .inventory
        .set_stock(GoodsId::new(req.goods_id), req.num)
        .await?;
    Ok(Json(Empty {}))
}

//! `goods.Goods` endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use catalog::{Goods, format_price};
use common::{GoodsId, RoomId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetGoodsByRoomRequest {
    #[serde(default)]
    pub room_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetGoodsDetailRequest {
    #[serde(default)]
    pub goods_id: i64,
    #[serde(default)]
    pub user_id: i64,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoodsSummary {
    pub goods_id: GoodsId,
    pub category_id: i64,
    pub status: i16,
    pub title: String,
    pub market_price: String,
    pub price: String,
    pub brief: String,
    pub head_imgs: Vec<String>,
}

impl From<Goods> for GoodsSummary {
    fn from(goods: Goods) -> Self {
        Self {
            goods_id: goods.goods_id,
            category_id: goods.category_id,
            status: goods.status,
            title: goods.title,
            market_price: format_price(goods.market_price),
            price: format_price(goods.price),
            brief: goods.brief,
            head_imgs: goods.head_imgs,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoodsByRoomResponse {
    /// Zero when the room presents nothing right now.
    pub current_goods_id: i64,
    pub data: Vec<GoodsSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoodsDetailResponse {
    pub goods_id: GoodsId,
    pub category_id: i64,
    pub brand_name: String,
    pub title: String,
    pub market_price: String,
    pub price: String,
    pub brief: String,
    pub head_imgs: Vec<String>,
    pub status: i16,
}

// -- Handlers --

/// POST /goods.Goods/GetGoodsByRoom
#[tracing::instrument(skip(state, req), fields(room_id = req.room_id))]
pub async fn get_goods_by_room(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GetGoodsByRoomRequest>,
) -> Result<Json<GoodsByRoomResponse>, ApiError> {
    let listing = state
        .catalog
        .get_goods_by_room(RoomId::new(req.room_id))
        .await?;

    Ok(Json(GoodsByRoomResponse {
        current_goods_id: listing.current_goods_id.map_or(0, |id| id.as_i64()),
        data: listing.goods.into_iter().map(GoodsSummary::from).collect(),
    }))
}

/// POST /goods.Goods/GetGoodsDetail
#[tracing::instrument(skip(state, req), fields(goods_id = req.goods_id, user_id = req.user_id))]
pub async fn get_goods_detail(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GetGoodsDetailRequest>,
) -> Result<Json<GoodsDetailResponse>, ApiError> {
    let goods = state
        .catalog
        .get_goods_detail(GoodsId::new(req.goods_id), UserId::new(req.user_id))
        .await?;

    Ok(Json(GoodsDetailResponse {
        goods_id: goods.goods_id,
        category_id: goods.category_id,
        brand_name: goods.brand_name,
        title: goods.title,
        market_price: format_price(goods.market_price),
        price: format_price(goods.price),
        brief: goods.brief,
        head_imgs: goods.head_imgs,
        status: goods.status,
    }))
}

use common::{GoodsId, RoomId};
use serde::{Deserialize, Serialize};

/// A goods item. Prices are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goods {
    pub goods_id: GoodsId,
    pub category_id: i64,
    pub brand_name: String,
    pub title: String,
    pub market_price: i64,
    pub price: i64,
    pub brief: String,
    pub head_imgs: Vec<String>,
    pub status: i16,
}

/// Binding of a goods item to a live room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomGoods {
    pub room_id: RoomId,
    pub goods_id: GoodsId,
    /// Listing order, ascending.
    pub weight: i32,
    pub is_current: bool,
}

/// The goods of one room, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomListing {
    /// Goods currently being presented, if any.
    pub current_goods_id: Option<GoodsId>,
    pub goods: Vec<Goods>,
}

/// Formats minor units as a decimal string with two places.
pub fn format_price(minor_units: i64) -> String {
    let sign = if minor_units < 0 { "-" } else { "" };
    let abs = minor_units.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

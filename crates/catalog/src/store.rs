use async_trait::async_trait;
use common::{GoodsId, RoomId};

use crate::Result;
use crate::model::{Goods, RoomGoods};

/// Core trait for catalog storage.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Reads the goods bound to a room, ordered by weight.
    async fn room_goods(&self, room_id: RoomId) -> Result<Vec<RoomGoods>>;

    /// Reads goods by id, in the order of `goods_ids`. Unknown ids are skipped.
    async fn goods_by_ids(&self, goods_ids: &[GoodsId]) -> Result<Vec<Goods>>;

    /// Reads one goods item.
    async fn goods(&self, goods_id: GoodsId) -> Result<Option<Goods>>;

    /// Creates or replaces a goods item.
    async fn upsert_goods(&self, goods: &Goods) -> Result<()>;

    /// Binds a goods item to a room. Marking it current clears the room's
    /// previous current goods.
    async fn bind_room_goods(&self, binding: RoomGoods) -> Result<()>;
}

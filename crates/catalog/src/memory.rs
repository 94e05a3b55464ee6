use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{GoodsId, RoomId};
use tokio::sync::RwLock;

use crate::Result;
use crate::model::{Goods, RoomGoods};
use crate::store::CatalogStore;

#[derive(Default)]
struct Tables {
    goods: HashMap<GoodsId, Goods>,
    rooms: HashMap<RoomId, Vec<RoomGoods>>,
}

/// In-memory catalog store for testing and development.
#[derive(Clone, Default)]
pub struct InMemoryCatalogStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn room_goods(&self, room_id: RoomId) -> Result<Vec<RoomGoods>> {
        let tables = self.tables.read().await;
        let mut bindings = tables.rooms.get(&room_id).cloned().unwrap_or_default();
        bindings.sort_by_key(|b| b.weight);
        Ok(bindings)
    }

    async fn goods_by_ids(&self, goods_ids: &[GoodsId]) -> Result<Vec<Goods>> {
        let tables = self.tables.read().await;
        Ok(goods_ids
            .iter()
            .filter_map(|id| tables.goods.get(id).cloned())
            .collect())
    }

    async fn goods(&self, goods_id: GoodsId) -> Result<Option<Goods>> {
        Ok(self.tables.read().await.goods.get(&goods_id).cloned())
    }

    async fn upsert_goods(&self, goods: &Goods) -> Result<()> {
        self.tables
            .write()
            .await
            .goods
            .insert(goods.goods_id, goods.clone());
        Ok(())
    }

    async fn bind_room_goods(&self, binding: RoomGoods) -> Result<()> {
        let mut tables = self.tables.write().await;
        let room = tables.rooms.entry(binding.room_id).or_default();
        if binding.is_current {
            for other in room.iter_mut() {
                other.is_current = false;
            }
        }
        match room.iter_mut().find(|b| b.goods_id == binding.goods_id) {
            Some(existing) => *existing = binding,
            None => room.push(binding),
        }
        Ok(())
    }
}

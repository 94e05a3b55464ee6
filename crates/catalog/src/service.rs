//! Catalog reads used by the goods RPCs and the order saga.

use std::sync::Arc;

use common::{GoodsId, RoomId, UserId};

use crate::model::{Goods, RoomListing};
use crate::store::CatalogStore;
use crate::{CatalogError, Result};

/// Read-side service over a [`CatalogStore`].
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// Lists the goods of a room in weight order and names the current one.
    ///
    /// A room without goods yields an empty listing.
    #[tracing::instrument(skip(self))]
    pub async fn get_goods_by_room(&self, room_id: RoomId) -> Result<RoomListing> {
        if !room_id.is_valid() {
            return Err(CatalogError::InvalidArgument(format!(
                "room id must be positive, got {room_id}"
            )));
        }

        let bindings = self.store.room_goods(room_id).await?;
        if bindings.is_empty() {
            return Ok(RoomListing::default());
        }

        let current_goods_id = bindings.iter().find(|b| b.is_current).map(|b| b.goods_id);
        let ids: Vec<GoodsId> = bindings.iter().map(|b| b.goods_id).collect();
        let goods = self.store.goods_by_ids(&ids).await?;
        tracing::debug!(count = goods.len(), "room goods loaded");

        Ok(RoomListing {
            current_goods_id,
            goods,
        })
    }

    /// Reads one goods item as seen by a user.
    ///
    /// Prices are list prices; no per-user promotion is applied.
    #[tracing::instrument(skip(self))]
    pub async fn get_goods_detail(&self, goods_id: GoodsId, user_id: UserId) -> Result<Goods> {
        if !goods_id.is_valid() {
            return Err(CatalogError::InvalidArgument(format!(
                "goods id must be positive, got {goods_id}"
            )));
        }
        if !user_id.is_valid() {
            return Err(CatalogError::InvalidArgument(format!(
                "user id must be positive, got {user_id}"
            )));
        }
        self.store
            .goods(goods_id)
            .await?
            .ok_or(CatalogError::GoodsNotFound(goods_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryCatalogStore;
    use crate::model::RoomGoods;

    const ROOM: RoomId = RoomId::new(10);

    fn goods(id: i64, price: i64) -> Goods {
        Goods {
            goods_id: GoodsId::new(id),
            category_id: 1,
            brand_name: "Acme".to_string(),
            title: format!("Goods {id}"),
            market_price: price + 100,
            price,
            brief: String::new(),
            head_imgs: vec![format!("https://img.example/{id}.png")],
            status: 1,
        }
    }

    async fn seeded() -> CatalogService {
        let store = InMemoryCatalogStore::new();
        for (id, weight, current) in [(1, 30, false), (2, 10, true), (3, 20, false)] {
            store.upsert_goods(&goods(id, id * 1000)).await.unwrap();
            store
                .bind_room_goods(RoomGoods {
                    room_id: ROOM,
                    goods_id: GoodsId::new(id),
                    weight,
                    is_current: current,
                })
                .await
                .unwrap();
        }
        CatalogService::new(Arc::new(store))
    }

    #[tokio::test]
    async fn room_listing_is_weight_ordered_with_current() {
        let service = seeded().await;
        let listing = service.get_goods_by_room(ROOM).await.unwrap();

        assert_eq!(listing.current_goods_id, Some(GoodsId::new(2)));
        let ids: Vec<i64> = listing.goods.iter().map(|g| g.goods_id.as_i64()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn binding_a_new_current_goods_clears_the_old_one() {
        let service = seeded().await;
        service
            .store()
            .bind_room_goods(RoomGoods {
                room_id: ROOM,
                goods_id: GoodsId::new(3),
                weight: 20,
                is_current: true,
            })
            .await
            .unwrap();

        let listing = service.get_goods_by_room(ROOM).await.unwrap();
        assert_eq!(listing.current_goods_id, Some(GoodsId::new(3)));
    }

    #[tokio::test]
    async fn empty_room_has_no_goods() {
        let service = seeded().await;
        let listing = service.get_goods_by_room(RoomId::new(99)).await.unwrap();
        assert_eq!(listing, RoomListing::default());
    }

    #[tokio::test]
    async fn invalid_ids_are_rejected() {
        let service = seeded().await;
        assert!(matches!(
            service.get_goods_by_room(RoomId::new(0)).await,
            Err(CatalogError::InvalidArgument(_))
        ));
        assert!(matches!(
            service
                .get_goods_detail(GoodsId::new(1), UserId::new(-3))
                .await,
            Err(CatalogError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn goods_detail() {
        let service = seeded().await;
        let detail = service
            .get_goods_detail(GoodsId::new(3), UserId::new(1))
            .await
            .unwrap();
        assert_eq!(detail.price, 3000);

        assert!(matches!(
            service
                .get_goods_detail(GoodsId::new(404), UserId::new(1))
                .await,
            Err(CatalogError::GoodsNotFound(_))
        ));
    }
}

//! Catalog client trait and its in-process implementation.

use async_trait::async_trait;
use catalog::CatalogService;
use common::{GoodsId, UserId};

use crate::error::SagaError;

/// Price lookup used by the local transaction.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Returns the unit price, in minor units, that `user_id` pays for `goods_id`.
    async fn unit_price(&self, goods_id: GoodsId, user_id: UserId) -> Result<i64, SagaError>;
}

#[async_trait]
impl CatalogClient for CatalogService {
    async fn unit_price(&self, goods_id: GoodsId, user_id: UserId) -> Result<i64, SagaError> {
        let goods = self.get_goods_detail(goods_id, user_id).await?;
        Ok(goods.price)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use catalog::{CatalogError, CatalogStore, Goods, InMemoryCatalogStore};

    use super::*;

    #[tokio::test]
    async fn test_unit_price_from_catalog() {
        let store = InMemoryCatalogStore::new();
        store
            .upsert_goods(&Goods {
                goods_id: GoodsId::new(1),
                category_id: 1,
                brand_name: String::new(),
                title: "Widget".to_string(),
                market_price: 1500,
                price: 1299,
                brief: String::new(),
                head_imgs: vec![],
                status: 1,
            })
            .await
            .unwrap();
        let client = CatalogService::new(Arc::new(store));

        let price = client
            .unit_price(GoodsId::new(1), UserId::new(1))
            .await
            .unwrap();
        assert_eq!(price, 1299);

        let missing = client.unit_price(GoodsId::new(2), UserId::new(1)).await;
        assert!(matches!(
            missing,
            Err(SagaError::Catalog(CatalogError::GoodsNotFound(_)))
        ));
    }
}

use async_trait::async_trait;
use common::{GoodsId, RoomId};
use sqlx::types::Json;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::Result;
use crate::model::{Goods, RoomGoods};
use crate::store::CatalogStore;

/// PostgreSQL-backed catalog store.
#[derive(Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_goods(row: &PgRow) -> Result<Goods> {
        let Json(head_imgs): Json<Vec<String>> = row.try_get("head_imgs")?;
        Ok(Goods {
            goods_id: GoodsId::new(row.try_get("goods_id")?),
            category_id: row.try_get("category_id")?,
            brand_name: row.try_get("brand_name")?,
            title: row.try_get("title")?,
            market_price: row.try_get("market_price")?,
            price: row.try_get("price")?,
            brief: row.try_get("brief")?,
            head_imgs,
            status: row.try_get("status")?,
        })
    }

    fn row_to_binding(row: &PgRow) -> Result<RoomGoods> {
        Ok(RoomGoods {
            room_id: RoomId::new(row.try_get("room_id")?),
            goods_id: GoodsId::new(row.try_get("goods_id")?),
            weight: row.try_get("weight")?,
            is_current: row.try_get("is_current")?,
        })
    }
}

const GOODS_COLUMNS: &str =
    "goods_id, category_id, brand_name, title, market_price, price, brief, head_imgs, status";

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn room_goods(&self, room_id: RoomId) -> Result<Vec<RoomGoods>> {
        let rows = sqlx::query(
            r#"
            SELECT room_id, goods_id, weight, is_current
            FROM room_goods
            WHERE room_id = $1
            ORDER BY weight ASC, goods_id ASC
            "#,
        )
        .bind(room_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_binding).collect()
    }

    async fn goods_by_ids(&self, goods_ids: &[GoodsId]) -> Result<Vec<Goods>> {
        let ids: Vec<i64> = goods_ids.iter().map(GoodsId::as_i64).collect();
        // Keep the caller's order.
        let sql = format!(
            r#"
            SELECT {GOODS_COLUMNS}
            FROM goods
            JOIN unnest($1::BIGINT[]) WITH ORDINALITY AS wanted(id, pos) ON goods.goods_id = wanted.id
            ORDER BY wanted.pos
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_goods).collect()
    }

    async fn goods(&self, goods_id: GoodsId) -> Result<Option<Goods>> {
        let sql = format!("SELECT {GOODS_COLUMNS} FROM goods WHERE goods_id = $1");
        let row = sqlx::query(&sql)
            .bind(goods_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_goods).transpose()
    }

    async fn upsert_goods(&self, goods: &Goods) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO goods (goods_id, category_id, brand_name, title, market_price,
                               price, brief, head_imgs, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (goods_id) DO UPDATE SET
                category_id = EXCLUDED.category_id,
                brand_name = EXCLUDED.brand_name,
                title = EXCLUDED.title,
                market_price = EXCLUDED.market_price,
                price = EXCLUDED.price,
                brief = EXCLUDED.brief,
                head_imgs = EXCLUDED.head_imgs,
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(goods.goods_id.as_i64())
        .bind(goods.category_id)
        .bind(&goods.brand_name)
        .bind(&goods.title)
        .bind(goods.market_price)
        .bind(goods.price)
        .bind(&goods.brief)
        .bind(Json(&goods.head_imgs))
        .bind(goods.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn bind_room_goods(&self, binding: RoomGoods) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if binding.is_current {
            sqlx::query("UPDATE room_goods SET is_current = FALSE WHERE room_id = $1")
                .bind(binding.room_id.as_i64())
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(
            r#"
            INSERT INTO room_goods (room_id, goods_id, weight, is_current)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (room_id, goods_id) DO UPDATE SET
                weight = EXCLUDED.weight,
                is_current = EXCLUDED.is_current
            "#,
        )
        .bind(binding.room_id.as_i64())
        .bind(binding.goods_id.as_i64())
        .bind(binding.weight)
        .bind(binding.is_current)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

use async_trait::async_trait;
use chrono::Utc;
use common::{GoodsId, OrderId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::model::{ReservationRecord, ReservationStatus, ReserveItem, RollbackOutcome, StockLevel};
use crate::store::StockStore;
use crate::{InventoryError, Result};

const UNIQUE_ORDER_GOODS: &str = "uq_stock_records_order_goods";

/// PostgreSQL-backed stock store.
///
/// Mutations lock the affected `stocks` rows with `FOR UPDATE` inside one
/// transaction, so concurrent writers serialize on the row even without the
/// lease lock.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    /// Creates a new PostgreSQL stock store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_level(row: &PgRow) -> Result<StockLevel> {
        Ok(StockLevel {
            goods_id: GoodsId::new(row.try_get("goods_id")?),
            available: row.try_get("available")?,
            reserved: row.try_get("reserved")?,
        })
    }

    fn row_to_record(row: &PgRow) -> Result<ReservationRecord> {
        let code: i16 = row.try_get("status")?;
        let status = ReservationStatus::from_code(code).ok_or_else(|| {
            InventoryError::Database(sqlx::Error::Decode(
                format!("unknown reservation status {code}").into(),
            ))
        })?;
        Ok(ReservationRecord {
            order_id: OrderId::new(row.try_get("order_id")?),
            goods_id: GoodsId::new(row.try_get("goods_id")?),
            quantity: row.try_get("quantity")?,
            status,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    async fn get_stock(&self, goods_id: GoodsId) -> Result<Option<StockLevel>> {
        let row = sqlx::query("SELECT goods_id, available, reserved FROM stocks WHERE goods_id = $1")
            .bind(goods_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_level).transpose()
    }

    async fn batch_get_stock(&self, goods_ids: &[GoodsId]) -> Result<Vec<StockLevel>> {
        let ids: Vec<i64> = goods_ids.iter().map(GoodsId::as_i64).collect();
        let rows = sqlx::query(
            r#"
            SELECT goods_id, available, reserved
            FROM stocks
            WHERE goods_id = ANY($1)
            ORDER BY goods_id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_level).collect()
    }

    async fn set_stock(&self, goods_id: GoodsId, available: i64) -> Result<StockLevel> {
        let row = sqlx::query(
            r#"
            INSERT INTO stocks (goods_id, available, reserved)
            VALUES ($1, $2, 0)
            ON CONFLICT (goods_id) DO UPDATE
                SET available = EXCLUDED.available, updated_at = NOW()
            RETURNING goods_id, available, reserved
            "#,
        )
        .bind(goods_id.as_i64())
        .bind(available)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_level(&row)
    }

    async fn reserve(&self, order_id: OrderId, items: &[ReserveItem]) -> Result<Vec<StockLevel>> {
        let mut tx = self.pool.begin().await?;
        let mut levels = Vec::with_capacity(items.len());

        for item in items {
            let row = sqlx::query(
                "SELECT goods_id, available, reserved FROM stocks WHERE goods_id = $1 FOR UPDATE",
            )
            .bind(item.goods_id.as_i64())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(InventoryError::NotFound(item.goods_id))?;
            let current = Self::row_to_level(&row)?;

            // Dropping the transaction rolls back earlier items.
            if current.available < item.quantity {
                return Err(InventoryError::Understock {
                    goods_id: item.goods_id,
                    available: current.available,
                    requested: item.quantity,
                });
            }

            sqlx::query(
                r#"
                INSERT INTO stock_records (order_id, goods_id, quantity, status)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(order_id.as_i64())
            .bind(item.goods_id.as_i64())
            .bind(item.quantity)
            .bind(ReservationStatus::Reserved.code())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some(UNIQUE_ORDER_GOODS)
                {
                    return InventoryError::DuplicateReservation {
                        order_id,
                        goods_id: item.goods_id,
                    };
                }
                InventoryError::Database(e)
            })?;

            let row = sqlx::query(
                r#"
                UPDATE stocks
                SET available = available - $2, reserved = reserved + $2, updated_at = NOW()
                WHERE goods_id = $1
                RETURNING goods_id, available, reserved
                "#,
            )
            .bind(item.goods_id.as_i64())
            .bind(item.quantity)
            .fetch_one(&mut *tx)
            .await?;
            levels.push(Self::row_to_level(&row)?);
        }

        tx.commit().await?;
        Ok(levels)
    }

    async fn rollback(&self, order_id: OrderId, goods_id: GoodsId) -> Result<RollbackOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query(
            r#"
            SELECT order_id, goods_id, quantity, status, created_at, updated_at
            FROM stock_records
            WHERE order_id = $1 AND goods_id = $2 AND status = $3
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_i64())
        .bind(goods_id.as_i64())
        .bind(ReservationStatus::Reserved.code())
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(RollbackOutcome::NotReserved);
        };
        let mut record = Self::row_to_record(&row)?;

        let row = sqlx::query(
            "SELECT goods_id, available, reserved FROM stocks WHERE goods_id = $1 FOR UPDATE",
        )
        .bind(goods_id.as_i64())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(InventoryError::NotFound(goods_id))?;
        let current = Self::row_to_level(&row)?;

        if current.reserved < record.quantity {
            return Err(InventoryError::InvariantViolation {
                goods_id,
                reserved: current.reserved,
                quantity: record.quantity,
            });
        }

        let row = sqlx::query(
            r#"
            UPDATE stocks
            SET available = available + $2, reserved = reserved - $2, updated_at = NOW()
            WHERE goods_id = $1
            RETURNING goods_id, available, reserved
            "#,
        )
        .bind(goods_id.as_i64())
        .bind(record.quantity)
        .fetch_one(&mut *tx)
        .await?;
        let level = Self::row_to_level(&row)?;

        let updated_at = Utc::now();
        sqlx::query(
            "UPDATE stock_records SET status = $3, updated_at = $4 WHERE order_id = $1 AND goods_id = $2",
        )
        .bind(order_id.as_i64())
        .bind(goods_id.as_i64())
        .bind(ReservationStatus::RolledBack.code())
        .bind(updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        record.status = ReservationStatus::RolledBack;
        record.updated_at = updated_at;
        Ok(RollbackOutcome::Restored { record, level })
    }

    async fn get_reservation(
        &self,
        order_id: OrderId,
        goods_id: GoodsId,
    ) -> Result<Option<ReservationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, goods_id, quantity, status, created_at, updated_at
            FROM stock_records
            WHERE order_id = $1 AND goods_id = $2
            "#,
        )
        .bind(order_id.as_i64())
        .bind(goods_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_record).transpose()
    }
}

use async_trait::async_trait;
use common::{GoodsId, OrderId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::store::{OrderStore, check_line_item, check_transition};
use crate::{Order, OrderLineItem, OrderStatus, OrderStoreError, ReceiverInfo, Result};

const ORDERS_PKEY: &str = "orders_pkey";

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let code: i32 = row.try_get("status")?;
        Ok(Order {
            order_id: OrderId::new(row.try_get("order_id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            pay_amount: row.try_get("pay_amount")?,
            status: OrderStatus::from_code(code).ok_or(OrderStoreError::UnknownStatus(code))?,
            receiver: ReceiverInfo {
                address: row.try_get("receive_address")?,
                name: row.try_get("receive_name")?,
                phone: row.try_get("receive_phone")?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_line_item(row: &PgRow) -> Result<OrderLineItem> {
        Ok(OrderLineItem {
            order_id: OrderId::new(row.try_get("order_id")?),
            goods_id: GoodsId::new(row.try_get("goods_id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            quantity: row.try_get("quantity")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip_all, fields(order_id = %order.order_id))]
    async fn create(&self, order: &Order, line_item: &OrderLineItem) -> Result<()> {
        check_line_item(order, line_item)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (order_id, user_id, pay_amount, status,
                                receive_address, receive_name, receive_phone,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.order_id.as_i64())
        .bind(order.user_id.as_i64())
        .bind(order.pay_amount)
        .bind(order.status.code())
        .bind(&order.receiver.address)
        .bind(&order.receiver.name)
        .bind(&order.receiver.phone)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(ORDERS_PKEY)
            {
                return OrderStoreError::AlreadyExists(order.order_id);
            }
            OrderStoreError::Database(e)
        })?;

        sqlx::query(
            r#"
            INSERT INTO order_line_items (order_id, goods_id, user_id, quantity)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(line_item.order_id.as_i64())
        .bind(line_item.goods_id.as_i64())
        .bind(line_item.user_id.as_i64())
        .bind(line_item.quantity)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, user_id, pay_amount, status,
                   receive_address, receive_name, receive_phone,
                   created_at, updated_at
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn line_items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, goods_id, user_id, quantity
            FROM order_line_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_line_item).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn transition(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        check_transition(from, to)?;
        let result = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = NOW() WHERE order_id = $1 AND status = $2",
        )
        .bind(order_id.as_i64())
        .bind(from.code())
        .bind(to.code())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

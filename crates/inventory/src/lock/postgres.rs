use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{LockLease, LockManager};
use crate::Result;

/// Lock manager backed by the `stock_locks` table.
///
/// A row is a held lease. Acquisition inserts the row, or overwrites it only
/// when the previous lease has expired.
#[derive(Clone)]
pub struct PostgresLockManager {
    pool: PgPool,
}

impl PostgresLockManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockManager for PostgresLockManager {
    async fn try_acquire(&self, key: &str, lease: Duration) -> Result<Option<LockLease>> {
        let token = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO stock_locks (lock_key, owner, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (lock_key) DO UPDATE
                SET owner = EXCLUDED.owner, expires_at = EXCLUDED.expires_at
                WHERE stock_locks.expires_at < NOW()
            RETURNING expires_at
            "#,
        )
        .bind(key)
        .bind(token)
        .bind(lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(LockLease {
                key: key.to_string(),
                token,
                expires_at: row.try_get("expires_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn release(&self, lease: &LockLease) -> Result<()> {
        sqlx::query("DELETE FROM stock_locks WHERE lock_key = $1 AND owner = $2")
            .bind(&lease.key)
            .bind(lease.token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

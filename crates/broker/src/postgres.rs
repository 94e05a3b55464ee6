//! PostgreSQL half-message store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::Result;
use crate::half_store::{HalfMessageStore, StoredHalfMessage};
use crate::message::{DelayLevel, Message, MessageId};

/// Keeps pending half messages in the `half_messages` table.
#[derive(Clone)]
pub struct PostgresHalfMessageStore {
    pool: PgPool,
}

impl PostgresHalfMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_stored(row: PgRow) -> Result<StoredHalfMessage> {
        let delay = row
            .try_get::<Option<i16>, _>("delay_level")?
            .map(|level| DelayLevel::new(level as u8))
            .transpose()?;
        let check_times: i32 = row.try_get("check_times")?;

        Ok(StoredHalfMessage {
            msg: Message {
                id: MessageId::from_uuid(row.try_get::<Uuid, _>("message_id")?),
                topic: row.try_get("topic")?,
                body: row.try_get("body")?,
                delay,
                reconsume_times: 0,
                born_at: row.try_get::<DateTime<Utc>, _>("born_at")?,
            },
            check_times: check_times.max(0) as u32,
        })
    }
}

#[async_trait]
impl HalfMessageStore for PostgresHalfMessageStore {
    async fn save(&self, msg: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO half_messages (message_id, topic, body, delay_level, born_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (message_id) DO NOTHING
            "#,
        )
        .bind(msg.id.as_uuid())
        .bind(&msg.topic)
        .bind(&msg.body)
        .bind(msg.delay.map(|level| level.level() as i16))
        .bind(msg.born_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, id: MessageId) -> Result<()> {
        sqlx::query("DELETE FROM half_messages WHERE message_id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_check(&self, id: MessageId) -> Result<()> {
        sqlx::query("UPDATE half_messages SET check_times = check_times + 1 WHERE message_id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stale(&self, older_than: Duration) -> Result<Vec<StoredHalfMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT message_id, topic, body, delay_level, born_at, check_times
            FROM half_messages
            WHERE created_at < NOW() - make_interval(secs => $1)
            ORDER BY created_at
            "#,
        )
        .bind(older_than.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_stored).collect()
    }
}

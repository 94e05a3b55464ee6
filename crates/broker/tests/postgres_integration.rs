//! PostgreSQL integration tests for the half-message store.
//!
//! These tests share one PostgreSQL container and truncate the table before
//! each test, so they run serially. Run with:
//!
//! ```bash
//! cargo test -p broker --test postgres_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use broker::{
    BrokerConfig, DelayLevel, HalfMessageStore, InMemoryBroker, LocalTxState, Message,
    PostgresHalfMessageStore, TransactionListener, TransactionProducer,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/004_create_half_messages_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Fresh pool with cleared tables
async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE half_messages")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

struct StalledListener;

#[async_trait::async_trait]
impl TransactionListener for StalledListener {
    async fn execute_local(&self, _msg: &Message) -> LocalTxState {
        std::future::pending().await
    }

    async fn check_local(&self, _msg: &Message) -> LocalTxState {
        LocalTxState::Unknown
    }
}

struct CommitOnCheck;

#[async_trait::async_trait]
impl TransactionListener for CommitOnCheck {
    async fn execute_local(&self, _msg: &Message) -> LocalTxState {
        LocalTxState::Unknown
    }

    async fn check_local(&self, _msg: &Message) -> LocalTxState {
        LocalTxState::Commit
    }
}

#[tokio::test]
#[serial]
async fn stored_message_round_trips() {
    let store = PostgresHalfMessageStore::new(get_test_pool().await);
    let msg = Message::new("stock-rollback", r#"{"orderId":1}"#)
        .with_delay(DelayLevel::TEN_SECONDS);

    store.save(&msg).await.unwrap();
    // Saving twice keeps one row.
    store.save(&msg).await.unwrap();
    store.record_check(msg.id).await.unwrap();

    assert!(store.stale(Duration::from_secs(60)).await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stale = store.stale(Duration::from_millis(10)).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].check_times, 1);
    assert_eq!(stale[0].msg.id, msg.id);
    assert_eq!(stale[0].msg.topic, msg.topic);
    assert_eq!(stale[0].msg.body, msg.body);
    assert_eq!(stale[0].msg.delay, Some(DelayLevel::TEN_SECONDS));

    store.remove(msg.id).await.unwrap();
    assert!(store.stale(Duration::ZERO).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn half_message_survives_broker_restart() {
    let pool = get_test_pool().await;
    let config = BrokerConfig {
        local_tx_timeout: Duration::from_millis(50),
        check_interval: Duration::from_millis(200),
        ..BrokerConfig::default()
    };

    let crashed = InMemoryBroker::with_config(config.clone())
        .with_half_message_store(Arc::new(PostgresHalfMessageStore::new(pool.clone())));
    let sent = crashed
        .send_in_transaction(Message::new("stock-rollback", "x"), Arc::new(StalledListener))
        .await
        .unwrap();
    assert_eq!(sent.state, LocalTxState::Unknown);
    drop(crashed);

    let restarted = InMemoryBroker::with_config(config.clone())
        .with_half_message_store(Arc::new(PostgresHalfMessageStore::new(pool.clone())));
    restarted.register_checker("stock-rollback", Arc::new(CommitOnCheck));

    tokio::time::sleep(config.check_interval + Duration::from_millis(100)).await;
    assert_eq!(restarted.check_pending_transactions().await, 1);

    let published = restarted.published("stock-rollback").await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id, sent.message_id);

    let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM half_messages")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(left, 0);
}

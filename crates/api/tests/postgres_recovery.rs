//! Half-message recovery across a process restart, against PostgreSQL.
//!
//! A local transaction reserves stock and then the process dies before
//! answering. A second process built over the same database must find the
//! half message and settle it. Run with:
//!
//! ```bash
//! cargo test -p api --test postgres_recovery
//! ```

use std::sync::Arc;
use std::time::Duration;

use api::{Config, Services, Stores};
use async_trait::async_trait;
use broker::{LocalTxState, Message, PushConsumer, TransactionListener, TransactionProducer};
use common::{GoodsId, OrderId, PAYMENT_TIMEOUT_TOPIC, STOCK_ROLLBACK_TOPIC, StockChange, UserId};
use inventory::{ReservationEngine, StockLevel};
use orders::{Order, OrderLineItem, OrderStatus, OrderStore, ReceiverInfo};
use saga::{STOCK_SERVICE_GROUP, StockRollbackHandler};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

const GOODS: GoodsId = GoodsId::new(1);

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
            api::run_migrations(&temp_pool).await.unwrap();
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
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE half_messages, stock_records, stock_locks, stocks, \
         order_line_items, orders",
    )
    .execute(&pool)
    .await
    .unwrap();

    pool
}

fn config() -> Config {
    Config {
        local_tx_timeout: Duration::from_millis(100),
        tx_check_interval: Duration::from_millis(500),
        ..Config::default()
    }
}

/// Runs the first steps of an order's local transaction, then never
/// answers, standing in for a process that dies mid-transaction.
struct CrashingTransaction {
    engine: ReservationEngine,
    orders: Option<Arc<dyn OrderStore>>,
    change: StockChange,
}

#[async_trait]
impl TransactionListener for CrashingTransaction {
    async fn execute_local(&self, _msg: &Message) -> LocalTxState {
        let change = self.change;
        self.engine
            .reserve(change.goods_id, change.num, change.order_id)
            .await
            .unwrap();
        if let Some(orders) = &self.orders {
            let order = Order::pending(change.order_id, UserId::new(42), 4_900, ReceiverInfo::default());
            let item = OrderLineItem::new(change.order_id, change.goods_id, UserId::new(42), change.num);
            orders.create(&order, &item).await.unwrap();
        }
        std::future::pending().await
    }

    async fn check_local(&self, _msg: &Message) -> LocalTxState {
        LocalTxState::Unknown
    }
}

/// Sends a stock-rollback half message from a process that then goes away.
async fn crash_mid_transaction(pool: &PgPool, change: StockChange, persist_order: bool) {
    let services = Services::new(&config(), Stores::postgres(pool.clone())).unwrap();
    services.state.inventory.set_stock(GOODS, 10).await.unwrap();

    let listener = CrashingTransaction {
        engine: services.state.inventory.clone(),
        orders: persist_order.then(|| services.state.orders.clone()),
        change,
    };
    let sent = services
        .broker
        .send_in_transaction(
            Message::json(STOCK_ROLLBACK_TOPIC, &change).unwrap(),
            Arc::new(listener),
        )
        .await
        .unwrap();
    assert_eq!(sent.state, LocalTxState::Unknown);
    assert_eq!(
        services.state.inventory.get_stock(GOODS).await.unwrap(),
        StockLevel::new(GOODS, 10 - change.num, change.num)
    );
}

async fn stored_half_messages(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM half_messages")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
#[serial]
async fn restarted_process_releases_stock_of_unfinished_order() {
    let pool = get_test_pool().await;
    let change = StockChange::new(OrderId::new(9_001), GOODS, 3);

    crash_mid_transaction(&pool, change, false).await;
    assert_eq!(stored_half_messages(&pool).await, 1);

    let services = Services::new(&config(), Stores::postgres(pool.clone())).unwrap();
    // Too young to recover: the sender may still be answering.
    assert_eq!(services.broker.check_pending_transactions().await, 0);

    tokio::time::sleep(config().tx_check_interval + Duration::from_millis(200)).await;
    assert_eq!(services.broker.check_pending_transactions().await, 1);
    assert_eq!(stored_half_messages(&pool).await, 0);

    let rollbacks = PushConsumer::new(
        Arc::new(services.broker.clone()),
        STOCK_ROLLBACK_TOPIC,
        STOCK_SERVICE_GROUP,
        Arc::new(StockRollbackHandler::new(services.state.inventory.clone())),
    );
    rollbacks.subscribe().await.unwrap();
    assert_eq!(rollbacks.drain().await.unwrap(), 1);
    assert_eq!(
        services.state.inventory.get_stock(GOODS).await.unwrap(),
        StockLevel::new(GOODS, 10, 0)
    );
}

#[tokio::test]
#[serial]
async fn restarted_process_schedules_timeout_for_persisted_order() {
    let pool = get_test_pool().await;
    let change = StockChange::new(OrderId::new(9_002), GOODS, 2);

    crash_mid_transaction(&pool, change, true).await;

    let services = Services::new(&config(), Stores::postgres(pool.clone())).unwrap();
    tokio::time::sleep(config().tx_check_interval + Duration::from_millis(200)).await;
    assert_eq!(services.broker.check_pending_transactions().await, 1);
    assert_eq!(stored_half_messages(&pool).await, 0);

    assert!(services.broker.published(STOCK_ROLLBACK_TOPIC).await.is_empty());
    assert_eq!(services.broker.scheduled_count(PAYMENT_TIMEOUT_TOPIC).await, 1);
    assert_eq!(
        services
            .state
            .orders
            .find(change.order_id)
            .await
            .unwrap()
            .unwrap()
            .status,
        OrderStatus::PendingPayment
    );
    assert_eq!(
        services.state.inventory.get_stock(GOODS).await.unwrap(),
        StockLevel::new(GOODS, 8, 2)
    );
}

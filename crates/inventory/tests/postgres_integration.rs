//! PostgreSQL integration tests for the stock store and lease lock.
//!
//! These tests share one PostgreSQL container and truncate the tables
//! before each test, so they run serially. Run with:
//!
//! ```bash
//! cargo test -p inventory --test postgres_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use common::{GoodsId, OrderId};
use futures_util::future::join_all;
use inventory::{
    InventoryError, LockManager, PostgresLockManager, PostgresStockStore, ReservationEngine,
    ReservationStatus, ReserveItem, RollbackOutcome, StockLevel, StockStore,
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
                "../../../migrations/001_create_inventory_tables.sql"
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
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE stocks, stock_records, stock_locks")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

const GOODS: GoodsId = GoodsId::new(421);

#[tokio::test]
#[serial]
async fn reserve_and_rollback_round_trip() {
    let store = PostgresStockStore::new(get_test_pool().await);
    store.set_stock(GOODS, 10).await.unwrap();
    let order = OrderId::new(1001);

    let levels = store
        .reserve(order, &[ReserveItem::new(GOODS, 3)])
        .await
        .unwrap();
    assert_eq!(levels, vec![StockLevel::new(GOODS, 7, 3)]);

    let record = store.get_reservation(order, GOODS).await.unwrap().unwrap();
    assert_eq!(record.status, ReservationStatus::Reserved);
    assert_eq!(record.quantity, 3);

    let outcome = store.rollback(order, GOODS).await.unwrap();
    assert!(outcome.is_restored());
    assert_eq!(
        store.rollback(order, GOODS).await.unwrap(),
        RollbackOutcome::NotReserved
    );

    assert_eq!(
        store.get_stock(GOODS).await.unwrap(),
        Some(StockLevel::new(GOODS, 10, 0))
    );
    let record = store.get_reservation(order, GOODS).await.unwrap().unwrap();
    assert_eq!(record.status, ReservationStatus::RolledBack);
}

#[tokio::test]
#[serial]
async fn understock_aborts_whole_batch() {
    let store = PostgresStockStore::new(get_test_pool().await);
    let scarce = GoodsId::new(422);
    store.set_stock(GOODS, 10).await.unwrap();
    store.set_stock(scarce, 1).await.unwrap();
    let order = OrderId::new(1002);

    let result = store
        .reserve(
            order,
            &[ReserveItem::new(GOODS, 2), ReserveItem::new(scarce, 2)],
        )
        .await;
    assert!(matches!(result, Err(InventoryError::Understock { .. })));

    assert_eq!(store.get_stock(GOODS).await.unwrap().unwrap().available, 10);
    assert!(store.get_reservation(order, GOODS).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn duplicate_reservation_maps_unique_violation() {
    let store = PostgresStockStore::new(get_test_pool().await);
    store.set_stock(GOODS, 10).await.unwrap();
    let order = OrderId::new(1003);

    store
        .reserve(order, &[ReserveItem::new(GOODS, 1)])
        .await
        .unwrap();
    let result = store.reserve(order, &[ReserveItem::new(GOODS, 1)]).await;

    assert!(matches!(
        result,
        Err(InventoryError::DuplicateReservation { .. })
    ));
    assert_eq!(store.get_stock(GOODS).await.unwrap().unwrap().available, 9);
}

#[tokio::test]
#[serial]
async fn unknown_goods_is_not_found() {
    let store = PostgresStockStore::new(get_test_pool().await);
    assert!(store.get_stock(GOODS).await.unwrap().is_none());
    let result = store
        .reserve(OrderId::new(1), &[ReserveItem::new(GOODS, 1)])
        .await;
    assert!(matches!(result, Err(InventoryError::NotFound(_))));
}

#[tokio::test]
#[serial]
async fn concurrent_engine_reserves_never_oversell() {
    let pool = get_test_pool().await;
    let engine = ReservationEngine::new(
        Arc::new(PostgresStockStore::new(pool.clone())),
        Arc::new(PostgresLockManager::new(pool)),
    );
    engine.set_stock(GOODS, 10).await.unwrap();

    let tasks = (1..=6).map(|n| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.reserve(GOODS, 4, OrderId::new(2000 + n)).await })
    });
    let succeeded = join_all(tasks)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count() as i64;

    assert_eq!(succeeded, 2);
    let level = engine.get_stock(GOODS).await.unwrap();
    assert_eq!(level.available, 10 - 4 * succeeded);
    assert_eq!(level.reserved, 4 * succeeded);
}

#[tokio::test]
#[serial]
async fn lease_excludes_other_owners_until_released_or_expired() {
    let locks = PostgresLockManager::new(get_test_pool().await);
    let lease = Duration::from_millis(300);

    let first = locks.try_acquire("k", lease).await.unwrap().unwrap();
    assert!(locks.try_acquire("k", lease).await.unwrap().is_none());

    locks.release(&first).await.unwrap();
    let second = locks.try_acquire("k", lease).await.unwrap().unwrap();

    // Let the lease lapse; a new owner takes it over.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let third = locks.try_acquire("k", lease).await.unwrap().unwrap();
    assert_ne!(third.token, second.token);

    // The stale owner cannot release the new lease.
    locks.release(&second).await.unwrap();
    assert!(locks.try_acquire("k", lease).await.unwrap().is_none());
}

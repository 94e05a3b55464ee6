//! Process wiring: stores, broker, saga coordinator and background tasks.

use std::sync::Arc;
use std::time::Duration;

use broker::{
    BrokerConfig, BrokerError, DelayLevel, HalfMessageStore, InMemoryBroker,
    PostgresHalfMessageStore, PushConsumer,
};
use catalog::{
    CatalogError, CatalogService, CatalogStore, Goods, InMemoryCatalogStore, PostgresCatalogStore,
    RoomGoods,
};
use common::{
    GoodsId, IdGenError, IdGenerator, PAYMENT_TIMEOUT_TOPIC, RoomId, STOCK_ROLLBACK_TOPIC,
};
use inventory::{
    InMemoryLockManager, InMemoryStockStore, InventoryError, LockManager, LockSettings,
    PostgresLockManager, PostgresStockStore, ReservationEngine, StockStore,
};
use orders::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use saga::{
    ORDER_SERVICE_GROUP, OrderSagaCoordinator, OrderStatusCheck, PaymentTimeoutHandler,
    STOCK_SERVICE_GROUP, SagaConfig, StockRollbackHandler,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;

/// Errors that stop the process from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid node id: {0}")]
    IdGenerator(#[from] IdGenError),

    #[error("Invalid broker setting: {0}")]
    Broker(#[from] BrokerError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Seeding catalog failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Seeding stock failed: {0}")]
    Inventory(#[from] InventoryError),
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub catalog: CatalogService,
    pub inventory: ReservationEngine,
    pub orders: Arc<dyn OrderStore>,
    pub coordinator: OrderSagaCoordinator,
}

/// Storage backends of the three services.
#[derive(Clone)]
pub struct Stores {
    pub stock: Arc<dyn StockStore>,
    pub locks: Arc<dyn LockManager>,
    pub orders: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn CatalogStore>,
    /// Durable half messages. Without one, pending half messages die with
    /// the process.
    pub half_messages: Option<Arc<dyn HalfMessageStore>>,
}

impl Stores {
    /// Everything in process memory.
    pub fn in_memory() -> Self {
        Self {
            stock: Arc::new(InMemoryStockStore::new()),
            locks: Arc::new(InMemoryLockManager::new()),
            orders: Arc::new(InMemoryOrderStore::new()),
            catalog: Arc::new(InMemoryCatalogStore::new()),
            half_messages: None,
        }
    }

    /// Everything in one PostgreSQL database, locks and half messages included.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            stock: Arc::new(PostgresStockStore::new(pool.clone())),
            locks: Arc::new(PostgresLockManager::new(pool.clone())),
            orders: Arc::new(PostgresOrderStore::new(pool.clone())),
            catalog: Arc::new(PostgresCatalogStore::new(pool.clone())),
            half_messages: Some(Arc::new(PostgresHalfMessageStore::new(pool))),
        }
    }
}

/// Connects to PostgreSQL and applies the migrations.
pub async fn connect(database_url: &str) -> Result<PgPool, StartupError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Runs the database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

/// Application state plus the broker it publishes through.
pub struct Services {
    pub state: Arc<AppState>,
    pub broker: InMemoryBroker,
}

impl Services {
    /// Wires the services over the given stores.
    pub fn new(config: &Config, stores: Stores) -> Result<Self, StartupError> {
        let mut broker = InMemoryBroker::with_config(BrokerConfig {
            local_tx_timeout: config.local_tx_timeout,
            check_interval: config.tx_check_interval,
            ..BrokerConfig::default()
        });
        if let Some(half_messages) = stores.half_messages {
            broker = broker.with_half_message_store(half_messages);
        }
        let payment_timeout_delay = DelayLevel::new(config.payment_timeout_delay_level)?;
        broker.register_checker(
            STOCK_ROLLBACK_TOPIC,
            Arc::new(OrderStatusCheck::new(
                stores.orders.clone(),
                Arc::new(broker.clone()),
                payment_timeout_delay,
            )),
        );

        let inventory = ReservationEngine::with_settings(
            stores.stock,
            stores.locks,
            LockSettings {
                lease: config.lock_lease,
                wait: config.lock_wait,
            },
        );
        let catalog = CatalogService::new(stores.catalog);

        let coordinator = OrderSagaCoordinator::new(
            Arc::new(IdGenerator::new(config.node_id)?),
            Arc::new(broker.clone()),
            Arc::new(broker.clone()),
            Arc::new(catalog.clone()),
            Arc::new(inventory.clone()),
            stores.orders.clone(),
            SagaConfig {
                payment_timeout_delay,
            },
        );

        Ok(Self {
            state: Arc::new(AppState {
                catalog,
                inventory,
                orders: stores.orders,
                coordinator,
            }),
            broker,
        })
    }

    /// Starts the half-message status checker and both consumer groups.
    ///
    /// Every task stops once `shutdown` flips to `true`.
    pub fn spawn_background(
        &self,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let stock_rollback = PushConsumer::new(
            Arc::new(self.broker.clone()),
            STOCK_ROLLBACK_TOPIC,
            STOCK_SERVICE_GROUP,
            Arc::new(StockRollbackHandler::new(self.state.inventory.clone())),
        )
        .with_poll_interval(poll_interval);

        let payment_timeout = PushConsumer::new(
            Arc::new(self.broker.clone()),
            PAYMENT_TIMEOUT_TOPIC,
            ORDER_SERVICE_GROUP,
            Arc::new(PaymentTimeoutHandler::new(
                self.state.orders.clone(),
                Arc::new(self.broker.clone()),
            )),
        )
        .with_poll_interval(poll_interval);

        let mut handles = vec![self.broker.spawn_transaction_checker(shutdown.clone())];
        for consumer in [stock_rollback, payment_timeout] {
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                let topic = consumer.topic().to_string();
                if let Err(e) = consumer.run(shutdown).await {
                    tracing::error!(%topic, error = %e, "consumer stopped");
                }
            }));
        }
        handles
    }
}

/// Seeds a small catalog for in-memory runs: room 1 presents goods 1 and 2,
/// each with 100 units in stock.
pub async fn seed_demo_data(state: &AppState) -> Result<(), StartupError> {
    let room = RoomId::new(1);
    let demo = [
        (GoodsId::new(1), "Espresso beans 1kg", 2_450, 2_990),
        (GoodsId::new(2), "Ceramic pour-over dripper", 1_899, 2_499),
    ];

    for (weight, (goods_id, title, price, market_price)) in demo.into_iter().enumerate() {
        state
            .catalog
            .store()
            .upsert_goods(&Goods {
                goods_id,
                category_id: 1,
                brand_name: "Demo".to_string(),
                title: title.to_string(),
                market_price,
                price,
                brief: String::new(),
                head_imgs: Vec::new(),
                status: 1,
            })
            .await?;
        state
            .catalog
            .store()
            .bind_room_goods(RoomGoods {
                room_id: room,
                goods_id,
                weight: weight as i32,
                is_current: weight == 0,
            })
            .await?;
        state.inventory.set_stock(goods_id, 100).await?;
    }

    tracing::info!(%room, goods = demo.len(), "seeded demo catalog");
    Ok(())
}

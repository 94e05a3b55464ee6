//! Inventory for the stock service.
//!
//! - [`StockStore`]: stock levels plus the append-only reservation ledger,
//!   with in-memory and PostgreSQL implementations
//! - [`LockManager`]: lease-based per-key mutual exclusion across processes
//! - [`ReservationEngine`]: idempotent reserve / rollback guarded by the
//!   per-goods lock

pub mod engine;
pub mod error;
pub mod lock;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use engine::{LockSettings, ReservationEngine};
pub use error::{InventoryError, Result};
pub use lock::{InMemoryLockManager, LockLease, LockManager, PostgresLockManager, stock_lock_key};
pub use memory::InMemoryStockStore;
pub use model::{ReservationRecord, ReservationStatus, ReserveItem, RollbackOutcome, StockLevel};
pub use postgres::PostgresStockStore;
pub use store::StockStore;

//! Order placement saga.
//!
//! Creating an order spans three services with no shared database
//! transaction. The coordinator publishes a stock-rollback *half message*
//! first, then runs the local transaction from the broker callback:
//!
//! 1. Look up the goods price
//! 2. Reserve stock
//! 3. Persist the order and its line item
//! 4. Schedule a delayed payment-timeout message
//!
//! Success discards the half message. Any failure commits it, so the
//! stock service receives the rollback trigger and releases whatever was
//! reserved. The compensator handles both the rollback trigger and the
//! payment timeout.

pub mod compensator;
pub mod coordinator;
pub mod error;
pub mod services;
pub mod state;
pub mod status_check;
pub mod transaction;

pub use compensator::{
    ORDER_SERVICE_GROUP, PaymentTimeoutHandler, STOCK_SERVICE_GROUP, StockRollbackHandler,
};
pub use coordinator::{CreateOrderRequest, OrderSagaCoordinator, SagaConfig};
pub use error::{Result, SagaError};
pub use services::{CatalogClient, StockClient};
pub use state::SagaState;
pub use status_check::OrderStatusCheck;
pub use transaction::OrderTransaction;

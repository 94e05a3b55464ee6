//! Saga error types.

use broker::BrokerError;
use catalog::CatalogError;
use common::OrderId;
use inventory::InventoryError;
use orders::OrderStoreError;
use thiserror::Error;

/// Errors that can occur during order creation and compensation.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A caller supplied a missing or non-positive field.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The order was not created; any reservation is being rolled back.
    #[error("Order {order_id} creation failed: {reason}")]
    OrderCreationFailed { order_id: OrderId, reason: String },

    /// Catalog lookup failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Stock reservation or rollback failed.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Order persistence failed.
    #[error("Order store error: {0}")]
    OrderStore(#[from] OrderStoreError),

    /// Publishing to the broker failed.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

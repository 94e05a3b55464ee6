use common::{GoodsId, OrderId};
use thiserror::Error;

/// Errors that can occur when reserving or restoring stock.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// A caller supplied a missing or non-positive identifier or quantity.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No stock row exists for the goods.
    #[error("Stock not found for goods {0}")]
    NotFound(GoodsId),

    /// Not enough available stock; nothing was reserved.
    #[error("Understock for goods {goods_id}: available {available}, requested {requested}")]
    Understock {
        goods_id: GoodsId,
        available: i64,
        requested: i64,
    },

    /// The order already holds a reservation for the goods.
    #[error("Order {order_id} already reserved goods {goods_id}")]
    DuplicateReservation { order_id: OrderId, goods_id: GoodsId },

    /// Restoring the reservation would drive the reserved count negative.
    #[error(
        "Invariant violation for goods {goods_id}: reserved {reserved} cannot release {quantity}"
    )]
    InvariantViolation {
        goods_id: GoodsId,
        reserved: i64,
        quantity: i64,
    },

    /// The per-goods lock could not be taken within the wait budget.
    #[error("Could not acquire lock {key}")]
    LockAcquisitionFailed { key: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl InventoryError {
    /// Returns true for failures that may succeed when retried unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InventoryError::Database(_) | InventoryError::LockAcquisitionFailed { .. }
        )
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

use common::OrderId;
use thiserror::Error;

use crate::OrderStatus;

/// Errors that can occur when reading or writing orders.
#[derive(Debug, Error)]
pub enum OrderStoreError {
    /// No order exists with the id.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// An order with the id was already persisted.
    #[error("Order already exists: {0}")]
    AlreadyExists(OrderId),

    /// The line item does not belong to the order being created.
    #[error("Line item belongs to order {item}, expected {order}")]
    LineItemMismatch { order: OrderId, item: OrderId },

    /// A stored status code has no matching [`OrderStatus`].
    #[error("Unknown order status code {0}")]
    UnknownStatus(i32),

    /// The requested transition is not part of the order lifecycle.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, OrderStoreError>;

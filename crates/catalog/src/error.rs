use common::GoodsId;
use thiserror::Error;

/// Errors that can occur when reading the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A caller supplied a non-positive identifier.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No goods exists with the id.
    #[error("Goods not found: {0}")]
    GoodsNotFound(GoodsId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

//! Clients for the services the saga calls.

pub mod catalog;
pub mod stock;

pub use catalog::CatalogClient;
pub use stock::StockClient;

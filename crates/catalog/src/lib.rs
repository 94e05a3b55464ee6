//! Goods catalog for the goods service.
//!
//! Rooms list goods in weight order, and at most one goods item per room is
//! the one currently being presented.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod service;
pub mod store;

pub use error::{CatalogError, Result};
pub use memory::InMemoryCatalogStore;
pub use model::{Goods, RoomGoods, RoomListing, format_price};
pub use postgres::PostgresCatalogStore;
pub use service::CatalogService;
pub use store::CatalogStore;

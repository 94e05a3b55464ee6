//! Orders for the order service.
//!
//! An [`Order`] and its [`OrderLineItem`] are written together in one local
//! transaction. After creation the only transitions the core performs are
//! conditional status updates such as PendingPayment → Closed.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod status;
pub mod store;

pub use error::{OrderStoreError, Result};
pub use memory::InMemoryOrderStore;
pub use model::{Order, OrderLineItem, ReceiverInfo};
pub use postgres::PostgresOrderStore;
pub use status::OrderStatus;
pub use store::OrderStore;

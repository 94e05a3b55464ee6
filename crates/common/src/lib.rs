//! Shared types for the goods, order and stock services.
//!
//! - Integer identifiers ([`OrderId`], [`GoodsId`], [`UserId`], [`RoomId`])
//! - The [`StockChange`] payload carried on the saga topics
//! - A snowflake-style [`IdGenerator`] used as the unique order-id source

pub mod id_gen;
pub mod payload;
pub mod types;

pub use id_gen::{IdGenError, IdGenerator};
pub use payload::{PAYMENT_TIMEOUT_TOPIC, STOCK_ROLLBACK_TOPIC, StockChange};
pub use types::{GoodsId, OrderId, RoomId, UserId};

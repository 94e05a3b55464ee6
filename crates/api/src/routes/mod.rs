pub mod goods;
pub mod health;
pub mod metrics;
pub mod order;
pub mod stock;

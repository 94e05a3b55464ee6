//! Transactional messaging for the order placement saga.
//!
//! The crate models the broker the services talk to:
//! - [`Producer`] for plain and delayed messages
//! - [`TransactionProducer`] + [`TransactionListener`] for half messages whose
//!   fate (commit or discard) is decided by a local transaction
//! - [`MessageSource`] + [`PushConsumer`] for consumer groups with
//!   at-least-once delivery and "retry later" redelivery
//!
//! [`InMemoryBroker`] implements all of them in-process. Pending half
//! messages can additionally be kept in a [`HalfMessageStore`] so status
//! checks survive a restart.

pub mod consumer;
pub mod error;
pub mod half_store;
pub mod memory;
pub mod message;
pub mod postgres;
pub mod producer;

pub use consumer::{ConsumeResult, MessageHandler, MessageSource, PushConsumer};
pub use error::{BrokerError, Result};
pub use half_store::{HalfMessageStore, InMemoryHalfMessageStore, StoredHalfMessage};
pub use memory::{BrokerConfig, InMemoryBroker};
pub use message::{DelayLevel, Message, MessageId};
pub use postgres::PostgresHalfMessageStore;
pub use producer::{
    LocalTxState, Producer, SendReceipt, TransactionListener, TransactionProducer,
    TransactionSendResult,
};

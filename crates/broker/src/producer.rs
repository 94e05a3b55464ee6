//! Producer-side traits: plain sends and transactional (half message) sends.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::message::{Message, MessageId};

/// Acknowledgement for a message accepted by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: MessageId,
    pub topic: String,
}

/// Outcome of a local transaction, deciding the fate of its half message.
///
/// ```text
/// half message ──► execute_local ──┬─► Commit  ──► delivered to consumers
///                                  ├─► Discard ──► dropped
///                                  └─► Unknown ──► check_local later
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalTxState {
    /// Make the half message visible to consumers.
    Commit,
    /// Withdraw the half message; it is never delivered.
    Discard,
    /// No decision yet; the broker will ask again through `check_local`.
    Unknown,
}

impl LocalTxState {
    /// Returns true if this state resolves the half message.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, LocalTxState::Unknown)
    }
}

impl std::fmt::Display for LocalTxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LocalTxState::Commit => "Commit",
            LocalTxState::Discard => "Discard",
            LocalTxState::Unknown => "Unknown",
        };
        write!(f, "{name}")
    }
}

/// Result of a transactional send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSendResult {
    pub message_id: MessageId,
    /// The state returned by the local transaction (or `Unknown` on timeout).
    pub state: LocalTxState,
}

/// Publisher-side callbacks of a transactional send.
#[async_trait]
pub trait TransactionListener: Send + Sync {
    /// Runs the local transaction right after the half message is stored.
    async fn execute_local(&self, msg: &Message) -> LocalTxState;

    /// Reports the outcome of a local transaction that never answered.
    ///
    /// Must be answerable from the message alone: the process that ran
    /// `execute_local` may be gone.
    async fn check_local(&self, msg: &Message) -> LocalTxState;
}

/// Sends plain and delayed messages.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Sends a message and waits for the broker to accept it.
    async fn send(&self, msg: Message) -> Result<SendReceipt>;
}

/// Sends half messages whose delivery depends on a local transaction.
#[async_trait]
pub trait TransactionProducer: Send + Sync {
    /// Stores `msg` as a half message, runs `listener.execute_local` and
    /// resolves the half message with the state it returns.
    async fn send_in_transaction(
        &self,
        msg: Message,
        listener: Arc<dyn TransactionListener>,
    ) -> Result<TransactionSendResult>;
}

//! Durable record of pending half messages.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::Result;
use crate::message::{Message, MessageId};

/// A pending half message loaded back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHalfMessage {
    pub msg: Message,
    /// Status checks already spent on the message.
    pub check_times: u32,
}

/// Storage for half messages between send and resolution.
#[async_trait]
pub trait HalfMessageStore: Send + Sync {
    /// Records a half message before its local transaction runs.
    async fn save(&self, msg: &Message) -> Result<()>;

    /// Forgets a resolved or expired half message.
    async fn remove(&self, id: MessageId) -> Result<()>;

    /// Counts one more unanswered status check.
    async fn record_check(&self, id: MessageId) -> Result<()>;

    /// Half messages saved more than `older_than` ago, oldest first.
    async fn stale(&self, older_than: Duration) -> Result<Vec<StoredHalfMessage>>;
}

struct Entry {
    stored: StoredHalfMessage,
    saved_at: Instant,
}

/// In-memory half-message store.
///
/// Clones share the same entries, so a test can drop a broker and hand the
/// store to its replacement.
#[derive(Clone, Default)]
pub struct InMemoryHalfMessageStore {
    entries: Arc<Mutex<HashMap<MessageId, Entry>>>,
}

impl InMemoryHalfMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl HalfMessageStore for InMemoryHalfMessageStore {
    async fn save(&self, msg: &Message) -> Result<()> {
        self.entries.lock().await.insert(
            msg.id,
            Entry {
                stored: StoredHalfMessage {
                    msg: msg.clone(),
                    check_times: 0,
                },
                saved_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn remove(&self, id: MessageId) -> Result<()> {
        self.entries.lock().await.remove(&id);
        Ok(())
    }

    async fn record_check(&self, id: MessageId) -> Result<()> {
        if let Some(entry) = self.entries.lock().await.get_mut(&id) {
            entry.stored.check_times += 1;
        }
        Ok(())
    }

    async fn stale(&self, older_than: Duration) -> Result<Vec<StoredHalfMessage>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        let mut stale: Vec<&Entry> = entries
            .values()
            .filter(|e| now.duration_since(e.saved_at) > older_than)
            .collect();
        stale.sort_by_key(|e| e.saved_at);
        Ok(stale.into_iter().map(|e| e.stored.clone()).collect())
    }
}

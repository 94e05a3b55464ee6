use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;

use crate::consumer::{MessageSource, dead_letter_topic};
use crate::half_store::{HalfMessageStore, StoredHalfMessage};
use crate::message::{DelayLevel, Message, MessageId};
use crate::producer::{
    LocalTxState, Producer, SendReceipt, TransactionListener, TransactionProducer,
    TransactionSendResult,
};
use crate::{BrokerError, Result};

/// Timing knobs of the in-memory broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// How long `execute_local` may run before the send reports `Unknown`.
    pub local_tx_timeout: Duration,
    /// Delay before the first status check of an unresolved half message,
    /// and between subsequent checks.
    pub check_interval: Duration,
    /// Status checks after which an unresolved half message is discarded.
    pub max_check_times: u32,
    /// Messages per topic kept for late subscribers and introspection.
    /// Older entries are dropped from the topic log; copies already queued
    /// for a subscribed group are unaffected.
    pub retained_messages: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            local_tx_timeout: Duration::from_secs(3),
            check_interval: Duration::from_secs(6),
            max_check_times: 15,
            retained_messages: 10_000,
        }
    }
}

#[derive(Clone)]
struct Scheduled {
    deliver_at: Instant,
    msg: Message,
}

#[derive(Default)]
struct TopicState {
    log: VecDeque<Scheduled>,
    groups: HashMap<String, VecDeque<Scheduled>>,
}

struct HalfMessage {
    msg: Message,
    listener: Arc<dyn TransactionListener>,
    check_times: u32,
    next_check_at: Instant,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, TopicState>,
    half: HashMap<MessageId, HalfMessage>,
}

impl BrokerState {
    fn publish(&mut self, msg: Message, now: Instant, retained: usize) {
        let deliver_at = msg
            .delay
            .map(|level| now + level.duration())
            .unwrap_or(now);
        let scheduled = Scheduled { deliver_at, msg };

        let topic = self.topics.entry(scheduled.msg.topic.clone()).or_default();
        for queue in topic.groups.values_mut() {
            queue.push_back(scheduled.clone());
        }
        topic.log.push_back(scheduled);
        while topic.log.len() > retained {
            topic.log.pop_front();
        }
    }
}

/// In-process broker implementing half messages, delay tiers, consumer
/// groups and redelivery.
///
/// Clones share the same state. Time is measured with `tokio::time`, so a
/// paused test runtime controls when delayed messages become due.
///
/// With a [`HalfMessageStore`] attached, pending half messages are also
/// written to durable storage. A restarted broker picks them up in
/// [`InMemoryBroker::check_pending_transactions`] and asks the checker
/// registered for their topic.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    config: BrokerConfig,
    half_store: Option<Arc<dyn HalfMessageStore>>,
    checkers: Arc<RwLock<HashMap<String, Arc<dyn TransactionListener>>>>,
}

impl InMemoryBroker {
    /// Creates a broker with default timings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker with the given timings.
    pub fn with_config(config: BrokerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Persists pending half messages in `store`.
    pub fn with_half_message_store(mut self, store: Arc<dyn HalfMessageStore>) -> Self {
        self.half_store = Some(store);
        self
    }

    /// Registers the listener that answers status checks for half messages
    /// on `topic` recovered from the half-message store.
    ///
    /// Only `check_local` is called on it.
    pub fn register_checker(&self, topic: impl Into<String>, listener: Arc<dyn TransactionListener>) {
        self.checkers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(topic.into(), listener);
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Retained messages on `topic` that are visible now, in publish order.
    pub async fn published(&self, topic: &str) -> Vec<Message> {
        let now = Instant::now();
        self.state
            .lock()
            .await
            .topics
            .get(topic)
            .map(|t| {
                t.log
                    .iter()
                    .filter(|s| s.deliver_at <= now)
                    .map(|s| s.msg.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of retained messages on `topic` still waiting for their delay
    /// to elapse.
    pub async fn scheduled_count(&self, topic: &str) -> usize {
        let now = Instant::now();
        self.state
            .lock()
            .await
            .topics
            .get(topic)
            .map(|t| t.log.iter().filter(|s| s.deliver_at > now).count())
            .unwrap_or(0)
    }

    /// Number of half messages awaiting a commit/discard decision.
    pub async fn pending_half_count(&self) -> usize {
        self.state.lock().await.half.len()
    }

    /// Applies a resolved state to a pending half message.
    ///
    /// Returns false when the half message was already resolved, so every
    /// half message is committed or discarded at most once.
    async fn resolve(&self, id: MessageId, tx_state: LocalTxState) -> bool {
        if !tx_state.is_resolved() {
            return false;
        }
        {
            let mut state = self.state.lock().await;
            let Some(half) = state.half.remove(&id) else {
                return false;
            };
            match tx_state {
                LocalTxState::Commit => {
                    tracing::info!(message_id = %id, topic = %half.msg.topic, "half message committed");
                    metrics::counter!("broker_messages_published_total", "topic" => half.msg.topic.clone())
                        .increment(1);
                    state.publish(half.msg, Instant::now(), self.config.retained_messages);
                }
                LocalTxState::Discard => {
                    tracing::debug!(message_id = %id, topic = %half.msg.topic, "half message discarded");
                }
                LocalTxState::Unknown => {}
            }
        }
        self.forget_stored(id).await;
        true
    }

    async fn forget_stored(&self, id: MessageId) {
        if let Some(store) = &self.half_store
            && let Err(e) = store.remove(id).await
        {
            // The row is checked again after recovery; both outcomes are
            // safe to repeat.
            tracing::warn!(message_id = %id, error = %e, "failed to remove stored half message");
        }
    }

    /// Loads stored half messages older than `check_interval` that this
    /// broker does not already track.
    async fn recover_stored(&self) {
        let Some(store) = &self.half_store else {
            return;
        };
        let stored = match store.stale(self.config.check_interval).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "failed to scan stored half messages");
                return;
            }
        };
        if stored.is_empty() {
            return;
        }

        let checkers = self
            .checkers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        let now = Instant::now();
        let mut state = self.state.lock().await;
        for StoredHalfMessage { msg, check_times } in stored {
            if state.half.contains_key(&msg.id) {
                continue;
            }
            let Some(listener) = checkers.get(&msg.topic) else {
                tracing::warn!(message_id = %msg.id, topic = %msg.topic, "no checker for stored half message");
                continue;
            };
            tracing::info!(message_id = %msg.id, topic = %msg.topic, check_times, "recovered half message");
            state.half.insert(
                msg.id,
                HalfMessage {
                    msg,
                    listener: listener.clone(),
                    check_times,
                    next_check_at: now,
                },
            );
        }
    }

    /// Runs `check_local` for every half message whose check is due.
    ///
    /// Returns the number of half messages resolved by this pass. Half
    /// messages still unknown after `max_check_times` checks are discarded.
    /// Stored half messages left behind by a previous process are recovered
    /// first.
    pub async fn check_pending_transactions(&self) -> usize {
        self.recover_stored().await;

        let now = Instant::now();
        let due: Vec<(MessageId, Message, Arc<dyn TransactionListener>)> = {
            let state = self.state.lock().await;
            state
                .half
                .iter()
                .filter(|(_, h)| h.next_check_at <= now)
                .map(|(id, h)| (*id, h.msg.clone(), h.listener.clone()))
                .collect()
        };

        let mut resolved = 0;
        for (id, msg, listener) in due {
            let tx_state =
                match tokio::time::timeout(self.config.local_tx_timeout, listener.check_local(&msg))
                    .await
                {
                    Ok(tx_state) => tx_state,
                    Err(_) => LocalTxState::Unknown,
                };
            tracing::debug!(message_id = %id, state = %tx_state, "transaction status checked");

            if self.resolve(id, tx_state).await {
                resolved += 1;
                continue;
            }

            let max_check_times = self.config.max_check_times;
            let expired = {
                let mut state = self.state.lock().await;
                let expired = match state.half.get_mut(&id) {
                    Some(half) => {
                        half.check_times += 1;
                        half.next_check_at = Instant::now() + self.config.check_interval;
                        half.check_times >= max_check_times
                    }
                    None => continue,
                };
                if expired {
                    state.half.remove(&id);
                }
                expired
            };

            if expired {
                tracing::warn!(
                    message_id = %id,
                    checks = max_check_times,
                    "half message never resolved, discarding"
                );
                self.forget_stored(id).await;
            } else if let Some(store) = &self.half_store
                && let Err(e) = store.record_check(id).await
            {
                tracing::warn!(message_id = %id, error = %e, "failed to record half message check");
            }
        }
        resolved
    }

    /// Spawns a task that runs [`InMemoryBroker::check_pending_transactions`]
    /// every `check_interval` until `shutdown` flips to `true`.
    pub fn spawn_transaction_checker(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let broker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(broker.config.check_interval);
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        broker.check_pending_transactions().await;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Producer for InMemoryBroker {
    async fn send(&self, msg: Message) -> Result<SendReceipt> {
        if msg.topic.is_empty() {
            return Err(BrokerError::TopicRequired);
        }
        let receipt = SendReceipt {
            message_id: msg.id,
            topic: msg.topic.clone(),
        };
        metrics::counter!("broker_messages_published_total", "topic" => msg.topic.clone())
            .increment(1);
        self.state
            .lock()
            .await
            .publish(msg, Instant::now(), self.config.retained_messages);
        Ok(receipt)
    }
}

#[async_trait]
impl TransactionProducer for InMemoryBroker {
    #[tracing::instrument(skip(self, msg, listener), fields(message_id = %msg.id, topic = %msg.topic))]
    async fn send_in_transaction(
        &self,
        msg: Message,
        listener: Arc<dyn TransactionListener>,
    ) -> Result<TransactionSendResult> {
        if msg.topic.is_empty() {
            return Err(BrokerError::TopicRequired);
        }
        let message_id = msg.id;

        if let Some(store) = &self.half_store {
            store.save(&msg).await?;
        }
        self.state.lock().await.half.insert(
            message_id,
            HalfMessage {
                msg: msg.clone(),
                listener: listener.clone(),
                check_times: 0,
                next_check_at: Instant::now() + self.config.check_interval,
            },
        );

        let state =
            match tokio::time::timeout(self.config.local_tx_timeout, listener.execute_local(&msg))
                .await
            {
                Ok(state) => state,
                Err(_) => {
                    tracing::warn!("local transaction timed out, awaiting status check");
                    LocalTxState::Unknown
                }
            };

        self.resolve(message_id, state).await;
        Ok(TransactionSendResult { message_id, state })
    }
}

#[async_trait]
impl MessageSource for InMemoryBroker {
    async fn subscribe(&self, topic: &str, group: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let topic_state = state.topics.entry(topic.to_string()).or_default();
        if !topic_state.groups.contains_key(group) {
            let backlog: VecDeque<Scheduled> = topic_state.log.iter().cloned().collect();
            topic_state.groups.insert(group.to_string(), backlog);
        }
        Ok(())
    }

    async fn poll(&self, topic: &str, group: &str) -> Result<Option<Message>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let queue = state
            .topics
            .get_mut(topic)
            .and_then(|t| t.groups.get_mut(group))
            .ok_or_else(|| BrokerError::NotSubscribed {
                topic: topic.to_string(),
                group: group.to_string(),
            })?;

        let due = queue.iter().position(|s| s.deliver_at <= now);
        Ok(due.and_then(|index| queue.remove(index)).map(|s| s.msg))
    }

    async fn reconsume_later(&self, group: &str, mut msg: Message) -> Result<()> {
        let delay = DelayLevel::for_retry(msg.reconsume_times);
        msg.reconsume_times += 1;
        metrics::counter!("broker_redeliveries_total", "topic" => msg.topic.clone()).increment(1);

        let mut state = self.state.lock().await;
        let queue = state
            .topics
            .get_mut(&msg.topic)
            .and_then(|t| t.groups.get_mut(group))
            .ok_or_else(|| BrokerError::NotSubscribed {
                topic: msg.topic.clone(),
                group: group.to_string(),
            })?;
        queue.push_back(Scheduled {
            deliver_at: Instant::now() + delay.duration(),
            msg,
        });
        Ok(())
    }

    async fn dead_letter(&self, group: &str, mut msg: Message) -> Result<()> {
        msg.topic = dead_letter_topic(group);
        msg.delay = None;
        self.state
            .lock()
            .await
            .publish(msg, Instant::now(), self.config.retained_messages);
        Ok(())
    }
}

//! Consumer-side traits and the push consumer loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::Result;
use crate::message::Message;

/// Default number of redeliveries before a message is dead-lettered.
pub const DEFAULT_MAX_RECONSUME_TIMES: u32 = 16;

/// What a handler wants done with a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeResult {
    /// The message is done with (processed, or dropped on purpose).
    Success,
    /// Deliver the message again after a back-off delay.
    RetryLater,
}

/// Business logic attached to a topic subscription.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one delivery. May run more than once for the same message.
    async fn consume(&self, msg: &Message) -> ConsumeResult;
}

/// Broker side of a consumer group subscription.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Registers `group` on `topic`. Idempotent.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<()>;

    /// Takes the next message that is due for `group`, if any.
    async fn poll(&self, topic: &str, group: &str) -> Result<Option<Message>>;

    /// Schedules a redelivery of `msg` to `group` after the retry back-off.
    async fn reconsume_later(&self, group: &str, msg: Message) -> Result<()>;

    /// Moves a message that exhausted its redeliveries to the group's dead-letter topic.
    async fn dead_letter(&self, group: &str, msg: Message) -> Result<()>;
}

/// Name of the dead-letter topic for a consumer group.
pub fn dead_letter_topic(group: &str) -> String {
    format!("%DLQ%{group}")
}

/// Polls a topic for one consumer group and dispatches deliveries to a handler.
///
/// Every delivery made by [`PushConsumer::run`] executes on its own tokio task.
#[derive(Clone)]
pub struct PushConsumer {
    source: Arc<dyn MessageSource>,
    handler: Arc<dyn MessageHandler>,
    topic: String,
    group: String,
    poll_interval: Duration,
    max_reconsume_times: u32,
}

impl PushConsumer {
    /// Creates a consumer; call [`PushConsumer::subscribe`] before polling.
    pub fn new(
        source: Arc<dyn MessageSource>,
        topic: impl Into<String>,
        group: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            source,
            handler,
            topic: topic.into(),
            group: group.into(),
            poll_interval: Duration::from_millis(100),
            max_reconsume_times: DEFAULT_MAX_RECONSUME_TIMES,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_reconsume_times(mut self, max: u32) -> Self {
        self.max_reconsume_times = max;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Registers the consumer group with the broker.
    pub async fn subscribe(&self) -> Result<()> {
        self.source.subscribe(&self.topic, &self.group).await
    }

    /// Handles every message that is currently due, one after another.
    ///
    /// Returns the number of deliveries made.
    pub async fn drain(&self) -> Result<usize> {
        let mut delivered = 0;
        while let Some(msg) = self.source.poll(&self.topic, &self.group).await? {
            self.dispatch(msg).await?;
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Runs the poll loop until `shutdown` flips to `true`.
    ///
    /// In-flight deliveries are awaited before returning.
    #[tracing::instrument(skip(self, shutdown), fields(topic = %self.topic, group = %self.group))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.subscribe().await?;
        tracing::info!("consumer started");

        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                () = tokio::time::sleep(self.poll_interval) => {
                    while let Some(msg) = self.source.poll(&self.topic, &self.group).await? {
                        let consumer = self.clone();
                        in_flight.spawn(async move { consumer.dispatch(msg).await });
                    }
                    while let Some(joined) = in_flight.try_join_next() {
                        log_dispatch_outcome(joined);
                    }
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            log_dispatch_outcome(joined);
        }
        tracing::info!("consumer stopped");
        Ok(())
    }

    async fn dispatch(&self, msg: Message) -> Result<()> {
        match self.handler.consume(&msg).await {
            ConsumeResult::Success => Ok(()),
            ConsumeResult::RetryLater if msg.reconsume_times >= self.max_reconsume_times => {
                tracing::error!(
                    message_id = %msg.id,
                    topic = %msg.topic,
                    reconsume_times = msg.reconsume_times,
                    "message exhausted redeliveries, moving to dead-letter topic"
                );
                self.source.dead_letter(&self.group, msg).await
            }
            ConsumeResult::RetryLater => {
                tracing::debug!(message_id = %msg.id, topic = %msg.topic, "redelivery requested");
                self.source.reconsume_later(&self.group, msg).await
            }
        }
    }
}

fn log_dispatch_outcome(joined: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "failed to settle delivery"),
        Err(e) => tracing::error!(error = %e, "delivery task panicked"),
    }
}

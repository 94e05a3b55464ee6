use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BrokerError, Result};

/// Unique identifier for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a message ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed delay tiers: `1s 5s 10s 30s 1m 2m 3m 4m 5m 6m 7m 8m 9m 10m 20m 30m 1h 2h`.
const DELAY_TIERS_SECS: [u64; 18] = [
    1, 5, 10, 30, 60, 120, 180, 240, 300, 360, 420, 480, 540, 600, 1200, 1800, 3600, 7200,
];

/// Index (1-based) into the broker's delay-tier table.
///
/// Delayed messages cannot carry an arbitrary delay, only one of the tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DelayLevel(u8);

impl DelayLevel {
    /// Lowest tier (1 second).
    pub const MIN: DelayLevel = DelayLevel(1);

    /// Highest tier (2 hours).
    pub const MAX: DelayLevel = DelayLevel(18);

    /// The 10 second tier, also the first redelivery back-off.
    pub const TEN_SECONDS: DelayLevel = DelayLevel(3);

    /// Creates a delay level, validating it against the tier table.
    pub fn new(level: u8) -> Result<Self> {
        if (1..=DELAY_TIERS_SECS.len() as u8).contains(&level) {
            Ok(Self(level))
        } else {
            Err(BrokerError::InvalidDelayLevel(level))
        }
    }

    /// Delay applied to the n-th redelivery of a message: level `3 + n`,
    /// capped at the highest tier.
    pub fn for_retry(reconsume_times: u32) -> Self {
        let level = 3u32.saturating_add(reconsume_times).min(Self::MAX.0 as u32);
        Self(level as u8)
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    /// Returns the wall-clock delay for this tier.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(DELAY_TIERS_SECS[(self.0 - 1) as usize])
    }
}

impl TryFrom<u8> for DelayLevel {
    type Error = BrokerError;

    fn try_from(level: u8) -> Result<Self> {
        Self::new(level)
    }
}

impl From<DelayLevel> for u8 {
    fn from(level: DelayLevel) -> Self {
        level.0
    }
}

impl std::fmt::Display for DelayLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "level {} ({:?})", self.0, self.duration())
    }
}

/// A message as seen by producers and consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub topic: String,
    pub body: Vec<u8>,
    /// Delay tier requested by the producer, if any.
    pub delay: Option<DelayLevel>,
    /// How many times consumers asked for this message to be redelivered.
    pub reconsume_times: u32,
    pub born_at: DateTime<Utc>,
}

impl Message {
    /// Creates a message with a fresh id.
    pub fn new(topic: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: MessageId::new(),
            topic: topic.into(),
            body: body.into(),
            delay: None,
            reconsume_times: 0,
            born_at: Utc::now(),
        }
    }

    /// Creates a message whose body is the JSON encoding of `payload`.
    pub fn json<T: Serialize>(topic: impl Into<String>, payload: &T) -> Result<Self> {
        Ok(Self::new(topic, serde_json::to_vec(payload)?))
    }

    /// Requests delivery after the given delay tier.
    pub fn with_delay(mut self, level: DelayLevel) -> Self {
        self.delay = Some(level);
        self
    }

    /// Decodes the JSON body.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

//! Snowflake-style unique id generation for order numbers.
//!
//! Layout (most significant first): 41 bits of milliseconds since
//! [`DEFAULT_EPOCH_MS`], 10 bits of node id, 12 bits of per-millisecond sequence.

use std::sync::Mutex;

use thiserror::Error;

use crate::OrderId;

/// 2020-12-31T00:00:00Z in unix milliseconds.
pub const DEFAULT_EPOCH_MS: i64 = 1_609_372_800_000;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_NODE: i64 = (1 << NODE_BITS) - 1;
const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;

/// Errors raised when configuring an [`IdGenerator`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdGenError {
    #[error("Node id {0} out of range 0..={MAX_NODE}")]
    NodeOutOfRange(i64),
}

#[derive(Debug)]
struct GeneratorState {
    last_ms: i64,
    sequence: i64,
}

/// Generates monotonic-ish, globally unique 63-bit ids.
///
/// Uniqueness across processes relies on every process using a distinct node id.
#[derive(Debug)]
pub struct IdGenerator {
    node_id: i64,
    epoch_ms: i64,
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    /// Creates a generator for the given node (0..=1023).
    pub fn new(node_id: i64) -> Result<Self, IdGenError> {
        Self::with_epoch(node_id, DEFAULT_EPOCH_MS)
    }

    /// Creates a generator with a custom epoch.
    pub fn with_epoch(node_id: i64, epoch_ms: i64) -> Result<Self, IdGenError> {
        if !(0..=MAX_NODE).contains(&node_id) {
            return Err(IdGenError::NodeOutOfRange(node_id));
        }
        Ok(Self {
            node_id,
            epoch_ms,
            state: Mutex::new(GeneratorState {
                last_ms: 0,
                sequence: 0,
            }),
        })
    }

    pub fn node_id(&self) -> i64 {
        self.node_id
    }

    /// Allocates the next order id.
    pub fn next_order_id(&self) -> OrderId {
        OrderId::new(self.next_id())
    }

    /// Allocates the next raw id.
    pub fn next_id(&self) -> i64 {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // A clock that steps backwards keeps using the last seen millisecond.
        let mut now = self.now_ms().max(state.last_ms);

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // Sequence exhausted: borrow the next millisecond instead of
                // waiting for the wall clock while holding the lock.
                now = state.last_ms + 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        (now << (NODE_BITS + SEQUENCE_BITS)) | (self.node_id << SEQUENCE_BITS) | state.sequence
    }

    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis() - self.epoch_ms
    }
}

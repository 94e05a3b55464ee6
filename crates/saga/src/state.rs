//! Saga state machine.

use broker::LocalTxState;
use serde::{Deserialize, Serialize};

/// The state of one order-creation saga.
///
/// State transitions:
/// ```text
/// Initiated ──► LocalTxRunning ──┬──► Committed   (order persisted, half message discarded)
///                                ├──► RolledBack  (half message committed, rollback published)
///                                └──► Unknown ──► Committed | RolledBack (status check)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Half message not yet handed to the broker.
    #[default]
    Initiated,

    /// The broker is running the local transaction callback.
    LocalTxRunning,

    /// The order stands (terminal state).
    Committed,

    /// The order failed and the rollback trigger was published (terminal state).
    RolledBack,

    /// The callback gave no answer in time; the broker's status check decides.
    Unknown,
}

impl SagaState {
    /// Maps the broker's resolution of the half message onto the saga.
    ///
    /// Discarding the rollback trigger means the order committed.
    pub fn from_resolution(state: LocalTxState) -> Self {
        match state {
            LocalTxState::Discard => SagaState::Committed,
            LocalTxState::Commit => SagaState::RolledBack,
            LocalTxState::Unknown => SagaState::Unknown,
        }
    }

    /// Returns true if the saga may move from this state to `next`.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        matches!(
            (self, next),
            (SagaState::Initiated, SagaState::LocalTxRunning)
                | (SagaState::LocalTxRunning, SagaState::Committed)
                | (SagaState::LocalTxRunning, SagaState::RolledBack)
                | (SagaState::LocalTxRunning, SagaState::Unknown)
                | (SagaState::Unknown, SagaState::Committed)
                | (SagaState::Unknown, SagaState::RolledBack)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Committed | SagaState::RolledBack)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Initiated => "Initiated",
            SagaState::LocalTxRunning => "LocalTxRunning",
            SagaState::Committed => "Committed",
            SagaState::RolledBack => "RolledBack",
            SagaState::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

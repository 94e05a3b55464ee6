//! Order lifecycle.

use serde::{Deserialize, Serialize};

/// The status of an order, persisted as its numeric code.
///
/// ```text
/// PendingPayment (100) ──► Paid (200)
///        │
///        └──────────────► Closed (300)
/// ```
///
/// Payment is owned outside this workspace; `Paid` is representable so
/// the timeout path can tell a paid order apart from a pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    Closed,
}

impl OrderStatus {
    /// Returns the persisted status code.
    pub fn code(&self) -> i32 {
        match self {
            OrderStatus::PendingPayment => 100,
            OrderStatus::Paid => 200,
            OrderStatus::Closed => 300,
        }
    }

    /// Parses a persisted status code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            100 => Some(OrderStatus::PendingPayment),
            200 => Some(OrderStatus::Paid),
            300 => Some(OrderStatus::Closed),
            _ => None,
        }
    }

    /// Returns true if an order may move from this status to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::PendingPayment, OrderStatus::Paid)
                | (OrderStatus::PendingPayment, OrderStatus::Closed)
        )
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PendingPayment",
            OrderStatus::Paid => "Paid",
            OrderStatus::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

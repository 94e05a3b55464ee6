//! Stock rows and the reservation ledger.

use chrono::{DateTime, Utc};
use common::{GoodsId, OrderId};
use serde::{Deserialize, Serialize};

/// Sellable and held stock for one goods item.
///
/// `available` and `reserved` are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub goods_id: GoodsId,
    /// Count sellable now.
    pub available: i64,
    /// Count pessimistically held against in-flight orders.
    pub reserved: i64,
}

impl StockLevel {
    pub fn new(goods_id: GoodsId, available: i64, reserved: i64) -> Self {
        Self {
            goods_id,
            available,
            reserved,
        }
    }
}

/// Lifecycle of a ledger entry. Persisted as the numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Reserved,
    RolledBack,
}

impl ReservationStatus {
    pub fn code(&self) -> i16 {
        match self {
            ReservationStatus::Reserved => 1,
            ReservationStatus::RolledBack => 3,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(ReservationStatus::Reserved),
            3 => Some(ReservationStatus::RolledBack),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationStatus::Reserved => write!(f, "Reserved"),
            ReservationStatus::RolledBack => write!(f, "RolledBack"),
        }
    }
}

/// One reservation attempt, keyed by `(order_id, goods_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub order_id: OrderId,
    pub goods_id: GoodsId,
    pub quantity: i64,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A goods/quantity pair to reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveItem {
    pub goods_id: GoodsId,
    pub quantity: i64,
}

impl ReserveItem {
    pub fn new(goods_id: GoodsId, quantity: i64) -> Self {
        Self { goods_id, quantity }
    }
}

/// Result of restoring a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// No reservation in `Reserved` state; nothing changed.
    NotReserved,
    /// Stock was returned and the ledger entry flipped to `RolledBack`.
    Restored {
        record: ReservationRecord,
        level: StockLevel,
    },
}

impl RollbackOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, RollbackOutcome::Restored { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_ledger_values() {
        assert_eq!(ReservationStatus::Reserved.code(), 1);
        assert_eq!(ReservationStatus::RolledBack.code(), 3);
        assert_eq!(
            ReservationStatus::from_code(3),
            Some(ReservationStatus::RolledBack)
        );
        assert_eq!(ReservationStatus::from_code(2), None);
    }
}

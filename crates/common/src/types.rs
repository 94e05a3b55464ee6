use serde::{Deserialize, Serialize};

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw identifier.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }

            /// Returns true if the identifier is strictly positive.
            ///
            /// Zero and negative values never name a real row.
            pub const fn is_valid(&self) -> bool {
                self.0 > 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

int_id!(
    /// Globally unique order number, allocated by the [`IdGenerator`](crate::IdGenerator).
    OrderId
);

int_id!(
    /// Identifier of a sellable goods item.
    GoodsId
);

int_id!(
    /// Identifier of the buying user.
    UserId
);

int_id!(
    /// Identifier of a live room that goods are bound to.
    RoomId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&GoodsId::new(42)).unwrap();
        assert_eq!(json, "42");

        let id: OrderId = serde_json::from_str("1700000000001").unwrap();
        assert_eq!(id.as_i64(), 1_700_000_000_001);
    }

    #[test]
    fn non_positive_ids_are_invalid() {
        assert!(UserId::new(1).is_valid());
        assert!(!UserId::new(0).is_valid());
        assert!(!GoodsId::new(-5).is_valid());
    }

    #[test]
    fn display_is_the_raw_number() {
        assert_eq!(RoomId::new(7).to_string(), "7");
    }
}

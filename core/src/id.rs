//! Opaque identifiers for layers, objects, operations and transactions.
//!
//! All identifiers are random v4 UUIDs wrapped in distinct newtypes so a
//! layer id can never be passed where an object id is expected. They
//! serialize as plain UUID strings.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Identifies a [`Layer`](crate::layer::Layer).
    LayerId
);
define_id!(
    /// Identifies a scene object; stable across save and restore.
    ObjectId
);
define_id!(
    /// Identifies a single [`Operation`](crate::operation::Operation).
    OperationId
);
define_id!(
    /// Identifies a [`Transaction`](crate::transaction::Transaction).
    ///
    /// Operations staged inside a transaction carry it as their batch id.
    TransactionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(LayerId::new(), LayerId::new());
        assert_ne!(ObjectId::new(), ObjectId::new());
    }

    #[test]
    fn parse_round_trips_display() {
        let id = LayerId::new();
        let parsed: LayerId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ObjectId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn debug_names_the_kind() {
        let id = TransactionId::new();
        assert!(format!("{id:?}").starts_with("TransactionId("));
    }
}

//! Typed identifiers
//!
//! Each entity gets its own UUID newtype so ids of different entities cannot
//! be mixed up. Ids serialize as the bare hyphenated UUID and display as a
//! short prefixed form (`acc-1a2b3c4d`) for terminal output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident => $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Prefix used by the short display form
            pub const PREFIX: &'static str = $prefix;

            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Full hyphenated UUID, used as the persistence key
            pub fn full(&self) -> String {
                self.0.hyphenated().to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let simple = self.0.simple().to_string();
                write!(f, "{}{}", $prefix, &simple[..8])
            }
        }

        /// Accepts the bare UUID or the UUID behind the display prefix
        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                let s = s.strip_prefix($prefix).unwrap_or(s);
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

entity_id!(
    /// Owner of a book; every other entity belongs to exactly one user
    UserId => "usr-"
);
entity_id!(AccountId => "acc-");
entity_id!(TransactionId => "txn-");
entity_id!(CategoryId => "cat-");
entity_id!(RecurrenceId => "rec-");
entity_id!(BudgetId => "bud-");
entity_id!(GoalId => "goal-");
entity_id!(AllocationId => "alloc-");

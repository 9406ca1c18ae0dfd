use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when an identifier cannot be parsed from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    pub input: String,
}

impl std::fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid identifier: {:?}", self.input)
    }
}

impl std::error::Error for ParseIdError {}

/// Declares a numeric row identifier.
///
/// Rows are keyed by auto-increment integers in the primary store; zero is
/// never a valid key and is treated as "missing" by the validation layer.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            pub const fn get(&self) -> u64 {
                self.0
            }

            /// Returns true for the zero id, which never names a stored row.
            pub const fn is_zero(&self) -> bool {
                self.0 == 0
            }

            /// Returns the id as a signed integer for SQL binds.
            pub fn as_i64(&self) -> i64 {
                self.0 as i64
            }

            pub fn from_i64(id: i64) -> Self {
                Self(id as u64)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self).map_err(|_| ParseIdError {
                    input: s.to_string(),
                })
            }
        }
    };
}

row_id!(
    /// Identifier of a registered user.
    UserId
);

row_id!(
    /// Identifier of an order row.
    OrderId
);

row_id!(
    /// Identifier of a catalogue product.
    ProductId
);

row_id!(
    /// Identifier of a shipping address.
    AddressId
);

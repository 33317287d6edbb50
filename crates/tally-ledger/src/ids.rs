//! Strongly typed identifiers.
//!
//! Every id is a positive integer. Zero and empty strings are rejected at
//! the boundary, so a vote set can never hold a placeholder entry.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "u64", into = "u64")]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw id, rejecting zero.
            pub fn new(raw: u64) -> Result<Self> {
                if raw == 0 {
                    return Err(Error::InvalidInput(format!("{} id must be positive", $label)));
                }
                Ok(Self(raw))
            }

            /// The raw integer value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl TryFrom<u64> for $name {
            type Error = Error;

            fn try_from(raw: u64) -> Result<Self> {
                Self::new(raw)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                let trimmed = s.trim();
                let raw: u64 = trimmed.parse().map_err(|_| {
                    Error::InvalidInput(format!("{} id {:?} is not a number", $label, s))
                })?;
                Self::new(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// A registered voter.
    VoterId,
    "voter"
);

define_id!(
    /// A votable discussion topic.
    TopicId,
    "topic"
);

define_id!(
    /// A topic category.
    CategoryId,
    "category"
);

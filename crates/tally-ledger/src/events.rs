//! Domain events raised by the surrounding forum, and the background jobs
//! they turn into.
//!
//! Events are facts ("topic 7 was closed"). Jobs are idempotent work items
//! that may run zero, one or many times.

use crate::ids::TopicId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A topic status flag that was switched on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFlag {
    Closed,
    Autoclosed,
    Archived,
    Visible,
    Pinned,
}

impl StatusFlag {
    /// Flags whose toggling releases or reclaims votes.
    pub const fn affects_votes(self) -> bool {
        matches!(self, StatusFlag::Closed | StatusFlag::Autoclosed | StatusFlag::Archived)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TopicEvent {
    /// A status flag was set (`enabled = true`) or cleared.
    StatusChanged {
        topic: TopicId,
        status: StatusFlag,
        enabled: bool,
    },
    /// The topic moved to another category.
    Recategorized { topic: TopicId },
    /// All of `orig` was moved into `dest`.
    Merged { orig: TopicId, dest: TopicId },
    /// Some category's voting configuration changed.
    CategoryConfigChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    /// Move active votes on `topic` to the archive.
    Release { topic: TopicId },
    /// Move archived votes on `topic` back to active.
    Reclaim { topic: TopicId },
    /// Fold votes on `orig` into `dest`.
    Merge { orig: TopicId, dest: TopicId },
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Release { topic } => write!(f, "release({})", topic),
            Job::Reclaim { topic } => write!(f, "reclaim({})", topic),
            Job::Merge { orig, dest } => write!(f, "merge({} -> {})", orig, dest),
        }
    }
}

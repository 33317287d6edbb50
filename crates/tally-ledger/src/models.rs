//! Records the ledger reads and writes.
//!
//! - [`Voter`] - identity, trust level and the four vote partitions
//! - [`Topic`] - a discussion topic; its vote count is stored separately
//! - [`Category`] - voting configuration for a group of topics

use crate::ids::{CategoryId, TopicId, VoterId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Vote direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// The other direction.
    pub const fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// Whether a vote counts against the voter's limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Active,
    Archived,
}

/// One of the four per-voter vote sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    ActiveUp,
    ArchivedUp,
    ActiveDown,
    ArchivedDown,
}

impl Slot {
    pub const ALL: [Slot; 4] = [
        Slot::ActiveUp,
        Slot::ArchivedUp,
        Slot::ActiveDown,
        Slot::ArchivedDown,
    ];

    pub const fn of(direction: Direction, partition: Partition) -> Self {
        match (direction, partition) {
            (Direction::Up, Partition::Active) => Slot::ActiveUp,
            (Direction::Up, Partition::Archived) => Slot::ArchivedUp,
            (Direction::Down, Partition::Active) => Slot::ActiveDown,
            (Direction::Down, Partition::Archived) => Slot::ArchivedDown,
        }
    }

    pub const fn direction(self) -> Direction {
        match self {
            Slot::ActiveUp | Slot::ArchivedUp => Direction::Up,
            Slot::ActiveDown | Slot::ArchivedDown => Direction::Down,
        }
    }

    pub const fn partition(self) -> Partition {
        match self {
            Slot::ActiveUp | Slot::ActiveDown => Partition::Active,
            Slot::ArchivedUp | Slot::ArchivedDown => Partition::Archived,
        }
    }

    /// Short tag used in storage keys.
    pub const fn tag(self) -> &'static str {
        match self {
            Slot::ActiveUp => "au",
            Slot::ArchivedUp => "xu",
            Slot::ActiveDown => "ad",
            Slot::ArchivedDown => "xd",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Slot::ALL.into_iter().find(|slot| slot.tag() == tag)
    }
}

/// A voter's four vote sets.
///
/// A topic is never in both active sets at once. The archived sets are
/// independent and may repeat ids held elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSets {
    #[serde(default)]
    pub active_up: BTreeSet<TopicId>,
    #[serde(default)]
    pub archived_up: BTreeSet<TopicId>,
    #[serde(default)]
    pub active_down: BTreeSet<TopicId>,
    #[serde(default)]
    pub archived_down: BTreeSet<TopicId>,
}

impl VoteSets {
    pub fn set(&self, slot: Slot) -> &BTreeSet<TopicId> {
        match slot {
            Slot::ActiveUp => &self.active_up,
            Slot::ArchivedUp => &self.archived_up,
            Slot::ActiveDown => &self.active_down,
            Slot::ArchivedDown => &self.archived_down,
        }
    }

    pub fn set_mut(&mut self, slot: Slot) -> &mut BTreeSet<TopicId> {
        match slot {
            Slot::ActiveUp => &mut self.active_up,
            Slot::ArchivedUp => &mut self.archived_up,
            Slot::ActiveDown => &mut self.active_down,
            Slot::ArchivedDown => &mut self.archived_down,
        }
    }

    pub fn contains(&self, slot: Slot, topic: TopicId) -> bool {
        self.set(slot).contains(&topic)
    }

    /// Insert; returns true if the set changed.
    pub fn insert(&mut self, slot: Slot, topic: TopicId) -> bool {
        self.set_mut(slot).insert(topic)
    }

    /// Remove; returns true if the set changed.
    pub fn remove(&mut self, slot: Slot, topic: TopicId) -> bool {
        self.set_mut(slot).remove(&topic)
    }

    /// Move `topic` from one set to another. Returns true if `from` held it.
    pub fn transfer(&mut self, from: Slot, to: Slot, topic: TopicId) -> bool {
        if self.remove(from, topic) {
            self.insert(to, topic);
            true
        } else {
            false
        }
    }

    /// Votes that count against the limit.
    pub fn active_count(&self) -> usize {
        self.active_up.len() + self.active_down.len()
    }

    /// True if any of the four sets mention `topic`.
    pub fn references(&self, topic: TopicId) -> bool {
        Slot::ALL.into_iter().any(|slot| self.contains(slot, topic))
    }

    /// Slots that contain `topic`.
    pub fn slots_of(&self, topic: TopicId) -> impl Iterator<Item = Slot> + '_ {
        Slot::ALL
            .into_iter()
            .filter(move |slot| self.contains(*slot, topic))
    }

    pub fn is_empty(&self) -> bool {
        Slot::ALL.into_iter().all(|slot| self.set(slot).is_empty())
    }
}

/// A registered voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    pub id: VoterId,

    /// Display handle
    pub username: String,

    /// Full name, if the voter set one
    #[serde(default)]
    pub name: Option<String>,

    /// Selects the vote limit
    #[serde(default)]
    pub trust_level: u8,

    #[serde(default)]
    pub votes: VoteSets,
}

impl Voter {
    /// Create a voter with no votes.
    pub fn new(id: VoterId, username: String, trust_level: u8) -> Self {
        Self {
            id,
            username,
            name: None,
            trust_level,
            votes: VoteSets::default(),
        }
    }

    pub fn summary(&self) -> VoterSummary {
        VoterSummary {
            id: self.id,
            username: self.username.clone(),
            name: self.name.clone(),
        }
    }
}

/// Public view of a voter, as listed by "who voted".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterSummary {
    pub id: VoterId,
    pub username: String,
    pub name: Option<String>,
}

/// Topic status as far as voting is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    #[default]
    Open,
    /// Closed manually or by the autoclose timer
    Closed,
    Archived,
}

/// A votable discussion topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,

    pub title: String,

    pub category_id: CategoryId,

    #[serde(default)]
    pub status: TopicStatus,
}

impl Topic {
    pub fn new(id: TopicId, title: String, category_id: CategoryId) -> Self {
        Self {
            id,
            title,
            category_id,
            status: TopicStatus::Open,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status != TopicStatus::Open
    }
}

/// Category configuration relevant to voting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,

    pub name: String,

    /// Per-category switch; topics in the category are votable only if set
    #[serde(default)]
    pub voting_enabled: bool,

    /// The topic that describes the category itself; never votable
    #[serde(default)]
    pub definition_topic: Option<TopicId>,
}

impl Category {
    pub fn new(id: CategoryId, name: String) -> Self {
        Self {
            id,
            name,
            voting_enabled: false,
            definition_topic: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: u64) -> TopicId {
        TopicId::new(raw).unwrap()
    }

    #[test]
    fn transfer_moves_only_when_present() {
        let mut sets = VoteSets::default();
        assert!(!sets.transfer(Slot::ActiveUp, Slot::ArchivedUp, t(1)));
        assert!(sets.archived_up.is_empty());

        sets.insert(Slot::ActiveUp, t(1));
        assert!(sets.transfer(Slot::ActiveUp, Slot::ArchivedUp, t(1)));
        assert!(!sets.contains(Slot::ActiveUp, t(1)));
        assert!(sets.contains(Slot::ArchivedUp, t(1)));
    }

    #[test]
    fn insert_collapses_duplicates() {
        let mut sets = VoteSets::default();
        assert!(sets.insert(Slot::ActiveDown, t(3)));
        assert!(!sets.insert(Slot::ActiveDown, t(3)));
        assert_eq!(sets.active_count(), 1);
    }

    #[test]
    fn archived_votes_do_not_count_against_limit() {
        let mut sets = VoteSets::default();
        sets.insert(Slot::ArchivedUp, t(1));
        sets.insert(Slot::ArchivedDown, t(2));
        sets.insert(Slot::ActiveUp, t(3));
        assert_eq!(sets.active_count(), 1);
        assert!(sets.references(t(2)));
        assert!(!sets.references(t(4)));
    }

    #[test]
    fn slot_tags_round_trip() {
        for slot in Slot::ALL {
            assert_eq!(Slot::from_tag(slot.tag()), Some(slot));
            assert_eq!(Slot::of(slot.direction(), slot.partition()), slot);
        }
        assert_eq!(Slot::from_tag("zz"), None);
    }

    #[test]
    fn missing_vote_sets_deserialize_empty() {
        let json = r#"{"id":5,"username":"ana"}"#;
        let voter: Voter = serde_json::from_str(json).unwrap();
        assert!(voter.votes.is_empty());
        assert_eq!(voter.trust_level, 0);
    }
}

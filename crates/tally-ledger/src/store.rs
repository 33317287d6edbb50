//! Storage seam for the ledger.
//!
//! The engine assumes a key-value attribute store: one record per voter,
//! topic and category, one cached integer per topic, and a reverse index
//! from topic to the voters holding it in each slot. [`MemoryStore`] is the
//! in-process implementation; the node crate provides a RocksDB one.
//!
//! Stores do not serialize read-modify-write cycles themselves. The engine
//! holds a per-voter lock around every `voter` / `put_voter` pair.

use crate::error::Result;
use crate::ids::{CategoryId, TopicId, VoterId};
use crate::models::{Category, Direction, Partition, Slot, Topic, VoteSets, Voter};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Voters referencing one topic, grouped by slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicVotes {
    pub active_up: BTreeSet<VoterId>,
    pub archived_up: BTreeSet<VoterId>,
    pub active_down: BTreeSet<VoterId>,
    pub archived_down: BTreeSet<VoterId>,
}

impl TopicVotes {
    pub fn voters(&self, slot: Slot) -> &BTreeSet<VoterId> {
        match slot {
            Slot::ActiveUp => &self.active_up,
            Slot::ArchivedUp => &self.archived_up,
            Slot::ActiveDown => &self.active_down,
            Slot::ArchivedDown => &self.archived_down,
        }
    }

    pub fn voters_mut(&mut self, slot: Slot) -> &mut BTreeSet<VoterId> {
        match slot {
            Slot::ActiveUp => &mut self.active_up,
            Slot::ArchivedUp => &mut self.archived_up,
            Slot::ActiveDown => &mut self.active_down,
            Slot::ArchivedDown => &mut self.archived_down,
        }
    }

    /// Distinct voters holding the topic in either partition of `direction`.
    pub fn total(&self, direction: Direction) -> usize {
        let active = self.voters(Slot::of(direction, Partition::Active));
        let archived = self.voters(Slot::of(direction, Partition::Archived));
        active.union(archived).count()
    }

    /// Up total minus down total.
    pub fn net(&self) -> i64 {
        let up = i64::try_from(self.total(Direction::Up)).unwrap_or(i64::MAX);
        let down = i64::try_from(self.total(Direction::Down)).unwrap_or(i64::MAX);
        up - down
    }

    /// Every voter referencing the topic in any slot.
    pub fn all_voters(&self) -> BTreeSet<VoterId> {
        Slot::ALL
            .into_iter()
            .flat_map(|slot| self.voters(slot).iter().copied())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        Slot::ALL.into_iter().all(|slot| self.voters(slot).is_empty())
    }
}

/// Persistence operations the ledger needs.
pub trait VoteStore: Send + Sync {
    fn voter(&self, id: VoterId) -> Result<Option<Voter>>;

    /// Write a voter record and keep the reverse index in step.
    fn put_voter(&self, voter: &Voter) -> Result<()>;

    fn topic(&self, id: TopicId) -> Result<Option<Topic>>;

    fn put_topic(&self, topic: &Topic) -> Result<()>;

    /// All topics, in id order.
    fn topics(&self) -> Result<Vec<Topic>>;

    fn category(&self, id: CategoryId) -> Result<Option<Category>>;

    fn put_category(&self, category: &Category) -> Result<()>;

    fn categories(&self) -> Result<Vec<Category>>;

    /// Consistent snapshot of every voter referencing `topic`.
    fn topic_votes(&self, topic: TopicId) -> Result<TopicVotes>;

    /// The cached aggregate, if it was ever computed.
    fn vote_count(&self, topic: TopicId) -> Result<Option<i64>>;

    fn set_vote_count(&self, topic: TopicId, count: i64) -> Result<()>;
}

/// Diff two vote-set states into reverse-index changes.
///
/// Returns `(slot, topic, added)` for each membership that changed.
pub fn index_changes(old: Option<&VoteSets>, new: &VoteSets) -> Vec<(Slot, TopicId, bool)> {
    let empty = VoteSets::default();
    let old = old.unwrap_or(&empty);
    let mut changes = Vec::new();
    for slot in Slot::ALL {
        let before = old.set(slot);
        let after = new.set(slot);
        changes.extend(before.difference(after).map(|topic| (slot, *topic, false)));
        changes.extend(after.difference(before).map(|topic| (slot, *topic, true)));
    }
    changes
}

#[derive(Debug, Default)]
struct MemoryState {
    voters: HashMap<VoterId, Voter>,
    topics: BTreeMap<TopicId, Topic>,
    categories: BTreeMap<CategoryId, Category>,
    counts: HashMap<TopicId, i64>,
    index: HashMap<TopicId, TopicVotes>,
}

/// In-memory [`VoteStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VoteStore for MemoryStore {
    fn voter(&self, id: VoterId) -> Result<Option<Voter>> {
        Ok(self.state.read().voters.get(&id).cloned())
    }

    fn put_voter(&self, voter: &Voter) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let changes = index_changes(state.voters.get(&voter.id).map(|v| &v.votes), &voter.votes);
        for (slot, topic, added) in changes {
            let entry = state.index.entry(topic).or_default();
            if added {
                entry.voters_mut(slot).insert(voter.id);
            } else {
                entry.voters_mut(slot).remove(&voter.id);
            }
            if entry.is_empty() {
                state.index.remove(&topic);
            }
        }
        state.voters.insert(voter.id, voter.clone());
        Ok(())
    }

    fn topic(&self, id: TopicId) -> Result<Option<Topic>> {
        Ok(self.state.read().topics.get(&id).cloned())
    }

    fn put_topic(&self, topic: &Topic) -> Result<()> {
        self.state.write().topics.insert(topic.id, topic.clone());
        Ok(())
    }

    fn topics(&self) -> Result<Vec<Topic>> {
        Ok(self.state.read().topics.values().cloned().collect())
    }

    fn category(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.state.read().categories.get(&id).cloned())
    }

    fn put_category(&self, category: &Category) -> Result<()> {
        self.state.write().categories.insert(category.id, category.clone());
        Ok(())
    }

    fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.state.read().categories.values().cloned().collect())
    }

    fn topic_votes(&self, topic: TopicId) -> Result<TopicVotes> {
        Ok(self.state.read().index.get(&topic).cloned().unwrap_or_default())
    }

    fn vote_count(&self, topic: TopicId) -> Result<Option<i64>> {
        Ok(self.state.read().counts.get(&topic).copied())
    }

    fn set_vote_count(&self, topic: TopicId, count: i64) -> Result<()> {
        self.state.write().counts.insert(topic, count);
        Ok(())
    }
}

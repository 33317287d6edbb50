//! The vote engine: shared state behind every ledger operation.
//!
//! Operations are split across modules by concern and all hang off
//! [`VoteEngine`]:
//!
//! - `ledger` - up/down/unvote and read-side queries
//! - `aggregate` - cached vote count recomputation
//! - `lifecycle` - release/reclaim and event planning
//! - `merge` - topic merge reconciliation

use crate::eligibility::EligibilityCache;
use crate::error::{Error, Result};
use crate::ids::{TopicId, VoterId};
use crate::locks::StripedLocks;
use crate::models::{Topic, Voter};
use crate::settings::VotingSettings;
use crate::store::VoteStore;
use std::sync::Arc;

pub struct VoteEngine<S> {
    pub(crate) store: Arc<S>,
    pub(crate) settings: VotingSettings,
    pub(crate) eligibility: EligibilityCache,
    pub(crate) voter_locks: StripedLocks,
    pub(crate) topic_locks: StripedLocks,
}

impl<S: VoteStore> VoteEngine<S> {
    pub fn new(store: Arc<S>, settings: VotingSettings) -> Self {
        Self {
            store,
            settings,
            eligibility: EligibilityCache::new(),
            voter_locks: StripedLocks::default(),
            topic_locks: StripedLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &VotingSettings {
        &self.settings
    }

    pub fn eligibility(&self) -> &EligibilityCache {
        &self.eligibility
    }

    /// Voting is on site-wide and the category has it enabled.
    pub fn category_allows_voting(&self, topic: &Topic) -> Result<bool> {
        if !self.settings.enabled {
            return Ok(false);
        }
        self.eligibility.allows(self.store.as_ref(), topic.category_id)
    }

    /// Whether `topic` accepts up-votes.
    ///
    /// A category's own definition topic never does.
    pub fn can_vote(&self, topic: &Topic) -> Result<bool> {
        if !self.category_allows_voting(topic)? {
            return Ok(false);
        }
        let definition = self
            .store
            .category(topic.category_id)?
            .and_then(|c| c.definition_topic);
        Ok(definition != Some(topic.id))
    }

    /// Whether votes on `topic` belong in the active sets: it is open and its
    /// category has voting enabled.
    pub fn keeps_votes_active(&self, topic: &Topic) -> Result<bool> {
        if topic.is_closed() {
            return Ok(false);
        }
        self.eligibility.allows(self.store.as_ref(), topic.category_id)
    }

    /// Whether `topic` accepts down-votes.
    pub fn can_down_vote(&self, topic: &Topic) -> Result<bool> {
        Ok(self.settings.allow_down_vote && self.can_vote(topic)?)
    }

    pub(crate) fn require_topic(&self, id: TopicId) -> Result<Topic> {
        self.store
            .topic(id)?
            .ok_or_else(|| Error::NotFound(format!("topic {}", id)))
    }

    pub(crate) fn require_voter(&self, id: VoterId) -> Result<Voter> {
        self.store
            .voter(id)?
            .ok_or_else(|| Error::NotFound(format!("voter {}", id)))
    }

    /// Read-modify-write one voter record under its lock.
    ///
    /// Returns `Ok(None)` if the voter does not exist. The record is only
    /// written back if `f` succeeded and changed it.
    pub(crate) fn update_voter<T, F>(&self, id: VoterId, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Voter) -> Result<T>,
    {
        let _guard = self.voter_locks.lock(&id);
        let Some(original) = self.store.voter(id)? else {
            return Ok(None);
        };
        let mut voter = original.clone();
        let out = f(&mut voter)?;
        if voter != original {
            self.store.put_voter(&voter)?;
        }
        Ok(Some(out))
    }

    /// Create a voter, or update an existing voter's profile while keeping
    /// their votes.
    pub fn save_profile(&self, profile: Voter) -> Result<Voter> {
        let _guard = self.voter_locks.lock(&profile.id);
        let voter = match self.store.voter(profile.id)? {
            Some(existing) => Voter {
                votes: existing.votes,
                ..profile
            },
            None => profile,
        };
        self.store.put_voter(&voter)?;
        Ok(voter)
    }
}

//! Vote ledger: casting, withdrawing and reading votes.
//!
//! Every mutation happens under the voter's lock and is followed by a
//! recount of the topic. Hitting the vote limit is a normal outcome,
//! reported through [`VoteReceipt::recorded`], not an error.

use crate::engine::VoteEngine;
use crate::error::{Error, Result};
use crate::ids::{TopicId, VoterId};
use crate::models::{Direction, Partition, Slot, Topic, Voter, VoterSummary};
use crate::settings::LimitStatus;
use crate::store::VoteStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Result of an up- or down-vote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    /// False when the voter was at their limit and nothing changed
    pub recorded: bool,

    /// The voter's limit position after the operation
    #[serde(flatten)]
    pub limit: LimitStatus,

    /// The topic's aggregate after the operation
    pub vote_count: i64,

    /// `None` when who-voted visibility is off
    pub up_voters: Option<Vec<VoterSummary>>,
}

/// Result of an unvote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnvoteReceipt {
    #[serde(flatten)]
    pub limit: LimitStatus,
    pub vote_count: i64,
    pub up_voters: Option<Vec<VoterSummary>>,
}

/// A voter's standing, for "current user" views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterStatus {
    pub voter: VoterSummary,
    #[serde(flatten)]
    pub limit: LimitStatus,
}

/// A topic with its voting state, for topic views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicTally {
    pub topic: Topic,
    pub can_vote: bool,
    pub can_down_vote: bool,
    pub vote_count: Option<i64>,
}

impl<S: VoteStore> VoteEngine<S> {
    /// Up-vote `topic` on behalf of `voter`.
    pub fn up_vote(&self, voter: VoterId, topic: TopicId) -> Result<VoteReceipt> {
        self.cast(voter, topic, Direction::Up)
    }

    /// Down-vote `topic` on behalf of `voter`.
    pub fn down_vote(&self, voter: VoterId, topic: TopicId) -> Result<VoteReceipt> {
        self.cast(voter, topic, Direction::Down)
    }

    fn cast(&self, voter_id: VoterId, topic_id: TopicId, direction: Direction) -> Result<VoteReceipt> {
        let topic = self.require_topic(topic_id)?;
        let allowed = match direction {
            Direction::Up => self.can_vote(&topic)?,
            Direction::Down => self.can_down_vote(&topic)?,
        };
        if !allowed {
            return Err(Error::InvalidAccess(format!(
                "topic {} does not accept {:?} votes",
                topic_id, direction
            )));
        }

        let slot = Slot::of(direction, Partition::Active);
        let opposite = Slot::of(direction.opposite(), Partition::Active);
        let settings = &self.settings;

        let (recorded, limit) = self
            .update_voter(voter_id, |voter| {
                if voter.votes.contains(slot, topic_id) {
                    return Err(Error::InvalidAccess(format!(
                        "voter {} already voted {:?} on topic {}",
                        voter_id, direction, topic_id
                    )));
                }
                let before = settings.limit_status(voter.trust_level, voter.votes.active_count());
                if before.limit_reached {
                    return Ok((false, before));
                }
                voter.votes.remove(opposite, topic_id);
                voter.votes.insert(slot, topic_id);
                let after = settings.limit_status(voter.trust_level, voter.votes.active_count());
                Ok((true, after))
            })?
            .ok_or_else(|| Error::NotFound(format!("voter {}", voter_id)))?;

        let vote_count = if recorded {
            debug!(voter = %voter_id, topic = %topic_id, ?direction, "Vote recorded");
            self.recompute_count(topic_id)?
        } else {
            info!(voter = %voter_id, topic = %topic_id, "Vote limit reached");
            self.store.vote_count(topic_id)?.unwrap_or(0)
        };

        Ok(VoteReceipt {
            recorded,
            limit,
            vote_count,
            up_voters: self.who_voted(topic_id)?,
        })
    }

    /// Withdraw any active vote `voter` holds on `topic`.
    ///
    /// Idempotent; no eligibility or limit check.
    pub fn unvote(&self, voter_id: VoterId, topic_id: TopicId) -> Result<UnvoteReceipt> {
        self.require_topic(topic_id)?;
        let settings = &self.settings;

        let limit = self
            .update_voter(voter_id, |voter| {
                voter.votes.remove(Slot::ActiveUp, topic_id);
                voter.votes.remove(Slot::ActiveDown, topic_id);
                Ok(settings.limit_status(voter.trust_level, voter.votes.active_count()))
            })?
            .ok_or_else(|| Error::NotFound(format!("voter {}", voter_id)))?;

        let vote_count = self.recompute_count(topic_id)?;
        debug!(voter = %voter_id, topic = %topic_id, "Vote withdrawn");

        Ok(UnvoteReceipt {
            limit,
            vote_count,
            up_voters: self.who_voted(topic_id)?,
        })
    }

    /// Active up-voters of `topic`, or `None` when visibility is off.
    pub fn who_voted(&self, topic: TopicId) -> Result<Option<Vec<VoterSummary>>> {
        if !self.settings.show_who_voted {
            return Ok(None);
        }
        let voters = self.active_voters(topic, Direction::Up)?;
        Ok(Some(voters.iter().map(Voter::summary).collect()))
    }

    /// Active down-voters of `topic`. Never exposed publicly.
    pub fn who_down_voted(&self, topic: TopicId) -> Result<Vec<VoterSummary>> {
        let voters = self.active_voters(topic, Direction::Down)?;
        Ok(voters.iter().map(Voter::summary).collect())
    }

    /// Voters holding an active vote on `topic` in `direction`.
    pub fn active_voters(&self, topic: TopicId, direction: Direction) -> Result<Vec<Voter>> {
        let votes = self.store.topic_votes(topic)?;
        let mut voters = Vec::new();
        for id in votes.voters(Slot::of(direction, Partition::Active)) {
            if let Some(voter) = self.store.voter(*id)? {
                voters.push(voter);
            }
        }
        Ok(voters)
    }

    pub fn user_up_voted(&self, voter: VoterId, topic: TopicId) -> Result<bool> {
        Ok(self
            .store
            .voter(voter)?
            .is_some_and(|v| v.votes.contains(Slot::ActiveUp, topic)))
    }

    pub fn user_down_voted(&self, voter: VoterId, topic: TopicId) -> Result<bool> {
        Ok(self
            .store
            .voter(voter)?
            .is_some_and(|v| v.votes.contains(Slot::ActiveDown, topic)))
    }

    pub fn user_voted(&self, voter: VoterId, topic: TopicId) -> Result<bool> {
        Ok(self.user_up_voted(voter, topic)? || self.user_down_voted(voter, topic)?)
    }

    /// A voter's limit position.
    pub fn voter_status(&self, voter: VoterId) -> Result<VoterStatus> {
        let voter = self.require_voter(voter)?;
        Ok(VoterStatus {
            voter: voter.summary(),
            limit: self
                .settings
                .limit_status(voter.trust_level, voter.votes.active_count()),
        })
    }

    /// Topics `voter` actively up-votes, or `None` when profile visibility
    /// is off.
    pub fn voted_by(&self, voter: VoterId) -> Result<Option<Vec<Topic>>> {
        if !self.settings.show_votes_on_profile {
            return Ok(None);
        }
        let voter = self.require_voter(voter)?;
        let mut topics = Vec::new();
        for id in &voter.votes.active_up {
            if let Some(topic) = self.store.topic(*id)? {
                topics.push(topic);
            }
        }
        Ok(Some(topics))
    }

    /// The cached count. Never-counted topics read as 0 if votable and
    /// `None` otherwise.
    pub fn topic_vote_count(&self, topic: &Topic) -> Result<Option<i64>> {
        match self.store.vote_count(topic.id)? {
            Some(count) => Ok(Some(count)),
            None if self.can_vote(topic)? => Ok(Some(0)),
            None => Ok(None),
        }
    }

    pub fn topic_tally(&self, id: TopicId) -> Result<TopicTally> {
        let topic = self.require_topic(id)?;
        Ok(TopicTally {
            can_vote: self.can_vote(&topic)?,
            can_down_vote: self.can_down_vote(&topic)?,
            vote_count: self.topic_vote_count(&topic)?,
            topic,
        })
    }

    /// All topics ordered by vote count, highest first. Ties go to the
    /// newest topic.
    pub fn topics_by_votes(&self) -> Result<Vec<(Topic, i64)>> {
        let mut ranked = Vec::new();
        for topic in self.store.topics()? {
            let count = self.store.vote_count(topic.id)?.unwrap_or(0);
            ranked.push((topic, count));
        }
        ranked.sort_by(|(a, ac), (b, bc)| bc.cmp(ac).then_with(|| b.id.cmp(&a.id)));
        Ok(ranked)
    }
}

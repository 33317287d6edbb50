//! Voting configuration and vote-limit arithmetic.
//!
//! The vote limit is a function of trust level and is never stored on the
//! voter. Only active votes count against it:
//!
//! - `remaining = max(limit - active, 0)`
//! - `limit_reached = active >= limit`
//! - `alert = limit - active <= alert_votes_left`

use serde::{Deserialize, Serialize};

/// Highest trust level with its own configured limit.
pub const MAX_TRUST_LEVEL: u8 = 4;

/// Site-wide voting settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingSettings {
    /// Master switch
    pub enabled: bool,

    pub allow_down_vote: bool,

    /// Expose the up-voter list on vote responses and `who`
    pub show_who_voted: bool,

    /// Expose per-voter "voted by" topic lists
    pub show_votes_on_profile: bool,

    /// Alert when this many votes or fewer remain
    pub alert_votes_left: u32,

    /// Vote limit indexed by trust level 0..=4
    pub trust_level_limits: [u32; 5],
}

impl Default for VotingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_down_vote: false,
            show_who_voted: true,
            show_votes_on_profile: true,
            alert_votes_left: 1,
            trust_level_limits: [2, 4, 6, 8, 10],
        }
    }
}

impl VotingSettings {
    /// Vote limit for a trust level. Levels above 4 use the level-4 limit.
    pub fn vote_limit(&self, trust_level: u8) -> u32 {
        self.trust_level_limits[usize::from(trust_level.min(MAX_TRUST_LEVEL))]
    }

    /// Limit status for a voter holding `active_votes` active votes.
    pub fn limit_status(&self, trust_level: u8, active_votes: usize) -> LimitStatus {
        LimitStatus::compute(
            self.vote_limit(trust_level),
            active_votes,
            self.alert_votes_left,
        )
    }
}

/// A voter's position relative to their vote limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitStatus {
    pub vote_limit: u32,
    /// Active up plus active down votes
    pub active_votes: u32,
    pub remaining: u32,
    pub limit_reached: bool,
    pub alert: bool,
}

impl LimitStatus {
    pub fn compute(vote_limit: u32, active_votes: usize, alert_votes_left: u32) -> Self {
        let used = u32::try_from(active_votes).unwrap_or(u32::MAX);
        let left = i64::from(vote_limit) - i64::from(used);
        Self {
            vote_limit,
            active_votes: used,
            remaining: vote_limit.saturating_sub(used),
            limit_reached: used >= vote_limit,
            alert: left <= i64::from(alert_votes_left),
        }
    }
}

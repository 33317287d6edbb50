//! Tally Ledger - vote ledger and consistency engine
//!
//! Voters spend a bounded number of up/down votes on eligible topics. The
//! ledger keeps each voter's vote sets and each topic's aggregate count in
//! agreement while topics close, reopen, change category or merge.
//!
//! # Components
//!
//! - **Eligibility cache**: category → voting enabled, rebuilt on demand
//! - **Vote ledger**: per-voter active/archived up/down sets, limit checks
//! - **Aggregation**: recomputes a topic's count from the ledger, never
//!   incrementally
//! - **Lifecycle manager**: releases votes on close, reclaims on reopen
//! - **Merge reconciler**: folds votes from a merged topic into its survivor
//!
//! # Invariants
//!
//! - A topic is in at most one of a voter's active up/down sets
//! - `|activeUp| + |activeDown| <= limit(trust level)` after any vote
//! - `count(t) = |voters with t up| - |voters with t down|`, counting
//!   archived votes too
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tally_ledger::{Category, CategoryId, MemoryStore, Topic, TopicId, Voter,
//!     VoterId, VoteEngine, VoteStore, VotingSettings};
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut features = Category::new(CategoryId::new(1)?, "Features".into());
//! features.voting_enabled = true;
//! store.put_category(&features)?;
//! store.put_topic(&Topic::new(TopicId::new(7)?, "Dark mode".into(), features.id))?;
//! store.put_voter(&Voter::new(VoterId::new(3)?, "ana".into(), 1))?;
//!
//! let engine = VoteEngine::new(store, VotingSettings::default());
//! let receipt = engine.up_vote(VoterId::new(3)?, TopicId::new(7)?)?;
//! assert!(receipt.recorded);
//! assert_eq!(receipt.vote_count, 1);
//! # Ok::<(), tally_ledger::Error>(())
//! ```

mod aggregate;
mod eligibility;
mod engine;
mod error;
mod events;
mod ids;
mod ledger;
mod lifecycle;
mod locks;
mod merge;
mod models;
mod settings;
mod store;

pub use aggregate::ConsistencyReport;
pub use eligibility::EligibilityCache;
pub use engine::VoteEngine;
pub use error::{Error, Result};
pub use events::{Job, StatusFlag, TopicEvent};
pub use ids::{CategoryId, TopicId, VoterId};
pub use ledger::{TopicTally, UnvoteReceipt, VoteReceipt, VoterStatus};
pub use lifecycle::JobReport;
pub use locks::StripedLocks;
pub use models::{
    Category, Direction, Partition, Slot, Topic, TopicStatus, VoteSets, Voter, VoterSummary,
};
pub use settings::{LimitStatus, VotingSettings, MAX_TRUST_LEVEL};
pub use store::{index_changes, MemoryStore, TopicVotes, VoteStore};

//! Lifecycle manager: keeps votes in step with topic state.
//!
//! Closing a topic **releases** its active votes into the archive, freeing
//! the voters' limit while the topic still counts them. Reopening it, or
//! moving it into a voting category, **reclaims** them.
//!
//! Both jobs are idempotent set moves followed by a recount. [`run`] checks
//! the topic's current state first, so a redelivered or replayed job that
//! no longer matches it is skipped. A missing topic is a silent no-op; a
//! missing or failing voter record is logged and skipped so one bad record
//! cannot abort the batch.
//!
//! [`run`]: VoteEngine::run

use crate::engine::VoteEngine;
use crate::error::Result;
use crate::events::{Job, TopicEvent};
use crate::ids::{TopicId, VoterId};
use crate::models::{Direction, Partition, Slot, VoteSets};
use crate::store::VoteStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// What a background job did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Vote entries moved or renamed
    pub changed: usize,
    /// Entries discarded because the voter already held the target
    pub dropped: usize,
    /// Voter records that were missing or failed
    pub skipped: usize,
    /// The job's topic no longer exists
    pub topic_missing: bool,
    /// The topic changed state after the job was queued; nothing ran
    #[serde(default)]
    pub stale: bool,
}

impl JobReport {
    fn missing() -> Self {
        Self {
            topic_missing: true,
            ..Self::default()
        }
    }
}

impl<S: VoteStore> VoteEngine<S> {
    /// Decide which job, if any, an event calls for.
    pub fn plan(&self, event: &TopicEvent) -> Result<Option<Job>> {
        match *event {
            TopicEvent::StatusChanged {
                topic,
                status,
                enabled,
            } => {
                if !status.affects_votes() {
                    return Ok(None);
                }
                Ok(Some(if enabled {
                    Job::Release { topic }
                } else {
                    Job::Reclaim { topic }
                }))
            }

            TopicEvent::Recategorized { topic } => {
                if !self.settings.enabled {
                    return Ok(None);
                }
                if self.store.topic_votes(topic)?.is_empty() {
                    debug!(topic = %topic, "Recategorized topic has no votes");
                    return Ok(None);
                }
                let Some(record) = self.store.topic(topic)? else {
                    return Ok(None);
                };
                if self.category_allows_voting(&record)? {
                    Ok(Some(Job::Reclaim { topic }))
                } else {
                    Ok(Some(Job::Release { topic }))
                }
            }

            TopicEvent::Merged { orig, dest } => {
                let Some(record) = self.store.topic(orig)? else {
                    return Ok(None);
                };
                if record.is_closed() && orig != dest {
                    Ok(Some(Job::Merge { orig, dest }))
                } else {
                    debug!(orig = %orig, dest = %dest, "Partial move, votes stay");
                    Ok(None)
                }
            }

            TopicEvent::CategoryConfigChanged => {
                self.eligibility.invalidate();
                Ok(None)
            }
        }
    }

    /// Execute a job.
    pub fn run(&self, job: Job) -> Result<JobReport> {
        if !self.job_is_current(job)? {
            info!(%job, "Topic state moved on, job skipped");
            return Ok(JobReport {
                stale: true,
                ..JobReport::default()
            });
        }
        let report = match job {
            Job::Release { topic } => self.release(topic)?,
            Job::Reclaim { topic } => self.reclaim(topic)?,
            Job::Merge { orig, dest } => self.merge_votes(orig, dest)?,
        };
        info!(
            %job,
            changed = report.changed,
            dropped = report.dropped,
            skipped = report.skipped,
            "Job finished"
        );
        Ok(report)
    }

    /// Release only applies while the topic keeps no active votes, reclaim
    /// only while it does.
    fn job_is_current(&self, job: Job) -> Result<bool> {
        let (topic, wants_active) = match job {
            Job::Release { topic } => (topic, false),
            Job::Reclaim { topic } => (topic, true),
            Job::Merge { .. } => return Ok(true),
        };
        match self.store.topic(topic)? {
            Some(record) => Ok(self.keeps_votes_active(&record)? == wants_active),
            None => Ok(true),
        }
    }

    /// Archive every active vote on `topic`.
    pub fn release(&self, topic: TopicId) -> Result<JobReport> {
        self.migrate(topic, Partition::Active, Partition::Archived)
    }

    /// Reactivate every archived vote on `topic`.
    pub fn reclaim(&self, topic: TopicId) -> Result<JobReport> {
        self.migrate(topic, Partition::Archived, Partition::Active)
    }

    fn migrate(&self, topic: TopicId, from: Partition, to: Partition) -> Result<JobReport> {
        if self.store.topic(topic)?.is_none() {
            debug!(topic = %topic, "Topic gone, nothing to migrate");
            return Ok(JobReport::missing());
        }

        let votes = self.store.topic_votes(topic)?;
        let mut report = JobReport::default();

        for direction in [Direction::Up, Direction::Down] {
            let source = Slot::of(direction, from);
            let target = Slot::of(direction, to);
            for voter_id in votes.voters(source) {
                let outcome = self.update_voter(*voter_id, |voter| {
                    Ok(migrate_entry(&mut voter.votes, topic, source, target))
                });
                tally_outcome(&mut report, *voter_id, topic, outcome);
            }
        }

        self.recompute_count(topic)?;
        Ok(report)
    }
}

/// Per-record result of a migration or merge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryOutcome {
    Unchanged,
    Changed(usize),
    Dropped(usize),
    Mixed { changed: usize, dropped: usize },
}

/// Move one entry between partitions.
///
/// Reclaiming into an active set never violates direction exclusivity: if
/// the voter has since cast the opposite active vote, the archived entry is
/// dropped instead.
fn migrate_entry(votes: &mut VoteSets, topic: TopicId, source: Slot, target: Slot) -> EntryOutcome {
    if !votes.contains(source, topic) {
        return EntryOutcome::Unchanged;
    }
    if target.partition() == Partition::Active {
        let opposite = Slot::of(target.direction().opposite(), Partition::Active);
        if votes.contains(opposite, topic) {
            votes.remove(source, topic);
            return EntryOutcome::Dropped(1);
        }
    }
    votes.transfer(source, target, topic);
    EntryOutcome::Changed(1)
}

pub(crate) fn tally_outcome(
    report: &mut JobReport,
    voter: VoterId,
    topic: TopicId,
    outcome: Result<Option<EntryOutcome>>,
) {
    match outcome {
        Ok(Some(EntryOutcome::Unchanged)) => {}
        Ok(Some(EntryOutcome::Changed(n))) => report.changed += n,
        Ok(Some(EntryOutcome::Dropped(n))) => report.dropped += n,
        Ok(Some(EntryOutcome::Mixed { changed, dropped })) => {
            report.changed += changed;
            report.dropped += dropped;
        }
        Ok(None) => {
            warn!(voter = %voter, topic = %topic, "Voter record missing, skipped");
            report.skipped += 1;
        }
        Err(e) => {
            warn!(voter = %voter, topic = %topic, "Voter update failed, skipped: {}", e);
            report.skipped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::*;
    use crate::events::StatusFlag;
    use crate::models::{Category, TopicStatus};
    use crate::settings::VotingSettings;

    fn down_votes_on() -> VotingSettings {
        VotingSettings {
            allow_down_vote: true,
            ..VotingSettings::default()
        }
    }

    #[test]
    fn status_events_plan_release_and_reclaim() {
        let engine = engine(VotingSettings::default());
        let topic = add_topic(&engine, 10, VOTING_CATEGORY);

        let close = TopicEvent::StatusChanged {
            topic,
            status: StatusFlag::Closed,
            enabled: true,
        };
        let reopen = TopicEvent::StatusChanged {
            topic,
            status: StatusFlag::Closed,
            enabled: false,
        };
        let pin = TopicEvent::StatusChanged {
            topic,
            status: StatusFlag::Pinned,
            enabled: true,
        };

        assert_eq!(engine.plan(&close).unwrap(), Some(Job::Release { topic }));
        assert_eq!(engine.plan(&reopen).unwrap(), Some(Job::Reclaim { topic }));
        assert_eq!(engine.plan(&pin).unwrap(), None);
    }

    #[test]
    fn release_then_reclaim_round_trips() {
        let engine = engine(down_votes_on());
        let topic = add_topic(&engine, 10, VOTING_CATEGORY);
        let other = add_topic(&engine, 11, VOTING_CATEGORY);
        let x = add_voter(&engine, 1, 2);
        let y = add_voter(&engine, 2, 2);

        engine.up_vote(x, topic).unwrap();
        engine.up_vote(x, other).unwrap();
        engine.down_vote(y, topic).unwrap();
        let before = (voter(&engine, x), voter(&engine, y));
        assert_eq!(engine.store().vote_count(topic).unwrap(), Some(0));

        let report = engine.release(topic).unwrap();
        assert_eq!(report.changed, 2);
        let rx = voter(&engine, x);
        assert!(rx.votes.contains(Slot::ArchivedUp, topic));
        assert!(!rx.votes.contains(Slot::ActiveUp, topic));
        assert!(rx.votes.contains(Slot::ActiveUp, other));
        assert!(voter(&engine, y).votes.contains(Slot::ArchivedDown, topic));
        assert_eq!(engine.store().vote_count(topic).unwrap(), Some(0));

        // running twice changes nothing
        assert_eq!(engine.release(topic).unwrap().changed, 0);

        engine.reclaim(topic).unwrap();
        assert_eq!((voter(&engine, x), voter(&engine, y)), before);
    }

    #[test]
    fn release_frees_limit() {
        let engine = engine(VotingSettings::default());
        let a = add_topic(&engine, 10, VOTING_CATEGORY);
        let b = add_topic(&engine, 11, VOTING_CATEGORY);
        let c = add_topic(&engine, 12, VOTING_CATEGORY);
        let x = add_voter(&engine, 1, 0);

        engine.up_vote(x, a).unwrap();
        engine.up_vote(x, b).unwrap();
        assert!(!engine.up_vote(x, c).unwrap().recorded);

        engine.release(a).unwrap();
        assert!(engine.up_vote(x, c).unwrap().recorded);
        assert_eq!(engine.store().vote_count(a).unwrap(), Some(1));
    }

    #[test]
    fn reclaim_yields_to_newer_opposite_vote() {
        let engine = engine(down_votes_on());
        let topic = add_topic(&engine, 10, VOTING_CATEGORY);
        let x = add_voter(&engine, 1, 2);

        let mut rx = voter(&engine, x);
        rx.votes.insert(Slot::ArchivedUp, topic);
        rx.votes.insert(Slot::ActiveDown, topic);
        engine.store().put_voter(&rx).unwrap();

        let report = engine.reclaim(topic).unwrap();
        assert_eq!(report.dropped, 1);
        let rx = voter(&engine, x);
        assert!(!rx.votes.contains(Slot::ActiveUp, topic));
        assert!(!rx.votes.contains(Slot::ArchivedUp, topic));
        assert!(rx.votes.contains(Slot::ActiveDown, topic));
        assert_eq!(engine.store().vote_count(topic).unwrap(), Some(-1));
    }

    #[test]
    fn stale_release_after_reopen_is_skipped() {
        let engine = engine(VotingSettings::default());
        let topic = add_topic(&engine, 10, VOTING_CATEGORY);
        let x = add_voter(&engine, 1, 1);
        engine.up_vote(x, topic).unwrap();

        let mut record = engine.store().topic(topic).unwrap().unwrap();
        record.status = TopicStatus::Closed;
        engine.store().put_topic(&record).unwrap();
        // the release for this close fails and stays queued
        record.status = TopicStatus::Open;
        engine.store().put_topic(&record).unwrap();
        assert!(!engine.run(Job::Reclaim { topic }).unwrap().stale);

        // replayed later, after the reopen
        let report = engine.run(Job::Release { topic }).unwrap();
        assert!(report.stale);
        assert_eq!(report.changed, 0);
        assert!(voter(&engine, x).votes.contains(Slot::ActiveUp, topic));
        assert_eq!(engine.store().vote_count(topic).unwrap(), Some(1));
    }

    #[test]
    fn stale_reclaim_on_closed_topic_is_skipped() {
        let engine = engine(VotingSettings::default());
        let topic = add_topic(&engine, 10, VOTING_CATEGORY);
        let x = add_voter(&engine, 1, 1);
        engine.up_vote(x, topic).unwrap();

        let mut record = engine.store().topic(topic).unwrap().unwrap();
        record.status = TopicStatus::Closed;
        engine.store().put_topic(&record).unwrap();
        assert_eq!(engine.run(Job::Release { topic }).unwrap().changed, 1);

        assert!(engine.run(Job::Reclaim { topic }).unwrap().stale);
        assert!(voter(&engine, x).votes.contains(Slot::ArchivedUp, topic));

        // a topic moved out of voting keeps its votes archived too
        record.status = TopicStatus::Open;
        record.category_id = cat(PLAIN_CATEGORY);
        engine.store().put_topic(&record).unwrap();
        assert!(engine.run(Job::Reclaim { topic }).unwrap().stale);
        assert!(voter(&engine, x).votes.contains(Slot::ArchivedUp, topic));
    }

    #[test]
    fn missing_topic_is_silent() {
        let engine = engine(VotingSettings::default());
        let report = engine.release(t(404)).unwrap();
        assert!(report.topic_missing);
        assert_eq!(report.changed, 0);
    }

    #[test]
    fn missing_voter_is_skipped() {
        let engine = engine(VotingSettings::default());
        let topic = add_topic(&engine, 10, VOTING_CATEGORY);
        let x = add_voter(&engine, 1, 0);
        engine.up_vote(x, topic).unwrap();

        let mut report = JobReport::default();
        tally_outcome(&mut report, v(2), topic, Ok(None));
        assert_eq!(report.skipped, 1);

        let report = engine.release(topic).unwrap();
        assert_eq!(report.changed, 1);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn recategorization_plans_by_new_eligibility() {
        let engine = engine(VotingSettings::default());
        let topic = add_topic(&engine, 10, VOTING_CATEGORY);
        let x = add_voter(&engine, 1, 0);
        engine.up_vote(x, topic).unwrap();

        let mut moved = engine.store().topic(topic).unwrap().unwrap();
        moved.category_id = cat(PLAIN_CATEGORY);
        engine.store().put_topic(&moved).unwrap();
        assert_eq!(
            engine.plan(&TopicEvent::Recategorized { topic }).unwrap(),
            Some(Job::Release { topic })
        );

        moved.category_id = cat(VOTING_CATEGORY);
        engine.store().put_topic(&moved).unwrap();
        assert_eq!(
            engine.plan(&TopicEvent::Recategorized { topic }).unwrap(),
            Some(Job::Reclaim { topic })
        );
    }

    #[test]
    fn recategorization_without_votes_plans_nothing() {
        let engine = engine(VotingSettings::default());
        let topic = add_topic(&engine, 10, VOTING_CATEGORY);
        assert_eq!(engine.plan(&TopicEvent::Recategorized { topic }).unwrap(), None);
    }

    #[test]
    fn category_change_invalidates_cache() {
        let engine = engine(VotingSettings::default());
        let topic = add_topic(&engine, 10, PLAIN_CATEGORY);
        let record = engine.store().topic(topic).unwrap().unwrap();
        assert!(!engine.can_vote(&record).unwrap());

        let mut plain = Category::new(cat(PLAIN_CATEGORY), "General".into());
        plain.voting_enabled = true;
        engine.store().put_category(&plain).unwrap();
        assert!(!engine.can_vote(&record).unwrap());

        assert_eq!(engine.plan(&TopicEvent::CategoryConfigChanged).unwrap(), None);
        assert!(engine.can_vote(&record).unwrap());
    }

    #[test]
    fn merge_planned_only_for_closed_origin() {
        let engine = engine(VotingSettings::default());
        let orig = add_topic(&engine, 10, VOTING_CATEGORY);
        let dest = add_topic(&engine, 11, VOTING_CATEGORY);
        let event = TopicEvent::Merged { orig, dest };

        assert_eq!(engine.plan(&event).unwrap(), None);

        let mut record = engine.store().topic(orig).unwrap().unwrap();
        record.status = TopicStatus::Closed;
        engine.store().put_topic(&record).unwrap();
        assert_eq!(engine.plan(&event).unwrap(), Some(Job::Merge { orig, dest }));
    }
}

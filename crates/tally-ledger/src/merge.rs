//! Merge reconciler: fold votes on a merged-away topic into its survivor.
//!
//! Each voter's entry for `orig` is renamed to `dest` in the same direction,
//! so their vote total is preserved. Renamed entries land in the partition
//! `dest` calls for right now: active while it is open and votable, archived
//! otherwise. `orig` is usually closed and already released when the merge
//! runs, and its archived votes must not stay archived on an open `dest`.
//!
//! If the voter already holds `dest` in that direction the `orig` entry is
//! dropped instead, and a voter never ends up holding `dest` in both active
//! directions. Up and down sets are handled independently, each with its
//! own sets only.

use crate::engine::VoteEngine;
use crate::error::Result;
use crate::ids::TopicId;
use crate::lifecycle::{tally_outcome, EntryOutcome, JobReport};
use crate::models::{Direction, Partition, Slot, VoteSets};
use crate::store::VoteStore;
use tracing::debug;

impl<S: VoteStore> VoteEngine<S> {
    /// Move every vote on `orig` over to `dest`, then recount both.
    pub fn merge_votes(&self, orig: TopicId, dest: TopicId) -> Result<JobReport> {
        let mut report = JobReport::default();
        if orig != dest {
            let landing = match self.store.topic(dest)? {
                Some(record) if self.keeps_votes_active(&record)? => Partition::Active,
                _ => Partition::Archived,
            };
            let votes = self.store.topic_votes(orig)?;
            debug!(
                orig = %orig,
                dest = %dest,
                voters = votes.all_voters().len(),
                ?landing,
                "Merging votes"
            );
            for voter_id in votes.all_voters() {
                let outcome = self.update_voter(voter_id, |voter| {
                    Ok(reconcile(&mut voter.votes, orig, dest, landing))
                });
                tally_outcome(&mut report, voter_id, orig, outcome);
            }
        }

        self.recompute_count(orig)?;
        self.recompute_count(dest)?;
        Ok(report)
    }
}

/// Rename or drop one voter's `orig` entries, placing renamed ones in
/// `landing`. Active sets go first.
fn reconcile(
    votes: &mut VoteSets,
    orig: TopicId,
    dest: TopicId,
    landing: Partition,
) -> EntryOutcome {
    let mut changed = 0;
    let mut dropped = 0;

    for direction in [Direction::Up, Direction::Down] {
        for partition in [Partition::Active, Partition::Archived] {
            let slot = Slot::of(direction, partition);
            if !votes.remove(slot, orig) {
                continue;
            }
            let holds_dest = votes.contains(Slot::of(direction, Partition::Active), dest)
                || votes.contains(Slot::of(direction, Partition::Archived), dest);
            let conflicts = landing == Partition::Active
                && votes.contains(Slot::of(direction.opposite(), Partition::Active), dest);
            if holds_dest || conflicts {
                dropped += 1;
            } else {
                votes.insert(Slot::of(direction, landing), dest);
                changed += 1;
            }
        }
    }

    match (changed, dropped) {
        (0, 0) => EntryOutcome::Unchanged,
        (n, 0) => EntryOutcome::Changed(n),
        (0, n) => EntryOutcome::Dropped(n),
        (changed, dropped) => EntryOutcome::Mixed { changed, dropped },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::*;
    use crate::models::TopicStatus;
    use crate::settings::VotingSettings;

    #[test]
    fn renames_or_drops_duplicates() {
        let engine = engine(VotingSettings::default());
        let a = add_topic(&engine, 10, VOTING_CATEGORY);
        let b = add_topic(&engine, 11, VOTING_CATEGORY);
        let x = add_voter(&engine, 1, 1);
        let y = add_voter(&engine, 2, 1);
        let z = add_voter(&engine, 3, 1);

        engine.up_vote(x, a).unwrap();
        engine.up_vote(y, a).unwrap();
        engine.up_vote(y, b).unwrap();
        engine.up_vote(z, b).unwrap();

        let report = engine.merge_votes(a, b).unwrap();
        assert_eq!(report.changed, 1);
        assert_eq!(report.dropped, 1);

        for id in [x, y, z] {
            let record = voter(&engine, id);
            assert_eq!(record.votes.active_up.iter().copied().collect::<Vec<_>>(), vec![b]);
        }
        assert_eq!(engine.store().vote_count(a).unwrap(), Some(0));
        assert_eq!(engine.store().vote_count(b).unwrap(), Some(3));
    }

    #[test]
    fn down_votes_merge_with_down_sets() {
        let engine = engine(VotingSettings {
            allow_down_vote: true,
            ..VotingSettings::default()
        });
        let a = add_topic(&engine, 10, VOTING_CATEGORY);
        let b = add_topic(&engine, 11, VOTING_CATEGORY);
        let x = add_voter(&engine, 1, 1);
        let y = add_voter(&engine, 2, 1);

        engine.down_vote(x, a).unwrap();
        engine.up_vote(x, b).unwrap();
        engine.down_vote(y, a).unwrap();

        engine.merge_votes(a, b).unwrap();

        let rx = voter(&engine, x);
        // x's up-vote on b stands; the conflicting down-vote is dropped
        assert!(rx.votes.contains(Slot::ActiveUp, b));
        assert!(!rx.votes.contains(Slot::ActiveDown, b));
        assert!(voter(&engine, y).votes.contains(Slot::ActiveDown, b));
        assert!(voter(&engine, y).votes.active_up.is_empty());
        assert_eq!(engine.store().vote_count(b).unwrap(), Some(0));
    }

    #[test]
    fn archived_votes_follow_merge() {
        let mut votes = VoteSets::default();
        votes.insert(Slot::ArchivedUp, t(1));
        votes.insert(Slot::ActiveUp, t(1));

        let outcome = reconcile(&mut votes, t(1), t(2), Partition::Active);
        assert_eq!(outcome, EntryOutcome::Mixed { changed: 1, dropped: 1 });
        assert!(votes.contains(Slot::ActiveUp, t(2)));
        assert!(!votes.contains(Slot::ArchivedUp, t(2)));
        assert!(!votes.references(t(1)));
    }

    #[test]
    fn released_votes_become_active_on_open_destination() {
        let engine = engine(VotingSettings::default());
        let a = add_topic(&engine, 10, VOTING_CATEGORY);
        let b = add_topic(&engine, 11, VOTING_CATEGORY);
        let x = add_voter(&engine, 1, 1);
        engine.up_vote(x, a).unwrap();

        let mut record = engine.store().topic(a).unwrap().unwrap();
        record.status = TopicStatus::Closed;
        engine.store().put_topic(&record).unwrap();
        engine.release(a).unwrap();
        assert!(voter(&engine, x).votes.contains(Slot::ArchivedUp, a));

        engine.merge_votes(a, b).unwrap();
        let rx = voter(&engine, x);
        assert!(rx.votes.contains(Slot::ActiveUp, b));
        assert!(rx.votes.archived_up.is_empty());
        assert_eq!(engine.store().vote_count(b).unwrap(), Some(1));

        // an ordinary unvote takes it back off
        engine.unvote(x, b).unwrap();
        assert!(voter(&engine, x).votes.is_empty());
        assert_eq!(engine.store().vote_count(b).unwrap(), Some(0));
    }

    #[test]
    fn closed_destination_receives_archived_votes() {
        let engine = engine(VotingSettings::default());
        let a = add_topic(&engine, 10, VOTING_CATEGORY);
        let b = add_topic(&engine, 11, VOTING_CATEGORY);
        let x = add_voter(&engine, 1, 1);
        engine.up_vote(x, a).unwrap();

        let mut record = engine.store().topic(b).unwrap().unwrap();
        record.status = TopicStatus::Closed;
        engine.store().put_topic(&record).unwrap();

        engine.merge_votes(a, b).unwrap();
        let rx = voter(&engine, x);
        assert!(rx.votes.contains(Slot::ArchivedUp, b));
        assert_eq!(rx.votes.active_count(), 0);
        assert_eq!(engine.store().vote_count(b).unwrap(), Some(1));
    }

    #[test]
    fn no_voters_is_cheap_noop() {
        let engine = engine(VotingSettings::default());
        let a = add_topic(&engine, 10, VOTING_CATEGORY);
        let b = add_topic(&engine, 11, VOTING_CATEGORY);

        let report = engine.merge_votes(a, b).unwrap();
        assert_eq!(report, JobReport::default());
        assert_eq!(engine.store().vote_count(a).unwrap(), Some(0));
        assert_eq!(engine.store().vote_count(b).unwrap(), Some(0));
    }

    #[test]
    fn self_merge_changes_nothing() {
        let engine = engine(VotingSettings::default());
        let a = add_topic(&engine, 10, VOTING_CATEGORY);
        let x = add_voter(&engine, 1, 1);
        engine.up_vote(x, a).unwrap();

        engine.merge_votes(a, a).unwrap();
        assert!(voter(&engine, x).votes.contains(Slot::ActiveUp, a));
        assert_eq!(engine.store().vote_count(a).unwrap(), Some(1));
    }
}

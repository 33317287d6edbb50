//! Persistent storage using RocksDB.
//!
//! Key layout (ids zero-padded so prefix scans come back in id order):
//!
//! - `voter:{id}`, `topic:{id}`, `category:{id}` - JSON records
//! - `count:{topic}` - cached vote count, JSON integer
//! - `vidx:{topic}:{slot}:{voter}` - reverse index, empty value
//! - `job:{seq}` - pending background job, JSON

use crate::error::{Error, Result};
use rocksdb::{Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tally_ledger::{
    index_changes, Category, CategoryId, Job, Slot, Topic, TopicId, TopicVotes, VoteStore, Voter,
    VoterId,
};

const JOB_PREFIX: &str = "job:";

fn voter_key(id: VoterId) -> String {
    format!("voter:{:020}", id.get())
}

fn topic_key(id: TopicId) -> String {
    format!("topic:{:020}", id.get())
}

fn category_key(id: CategoryId) -> String {
    format!("category:{:020}", id.get())
}

fn count_key(id: TopicId) -> String {
    format!("count:{:020}", id.get())
}

fn index_prefix(topic: TopicId) -> String {
    format!("vidx:{:020}:", topic.get())
}

fn index_key(topic: TopicId, slot: Slot, voter: VoterId) -> String {
    format!("{}{}:{:020}", index_prefix(topic), slot.tag(), voter.get())
}

fn job_key(seq: u64) -> String {
    format!("{}{:020}", JOB_PREFIX, seq)
}

/// Storage backend for the node.
pub struct Storage {
    db: DB,
    next_job: AtomicU64,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;

        let storage = Self {
            db,
            next_job: AtomicU64::new(0),
        };
        let next = storage
            .pending_jobs()?
            .last()
            .map_or(0, |(seq, _)| seq + 1);
        storage.next_job.store(next, Ordering::SeqCst);
        Ok(storage)
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_vec(value)?;
        self.db.put(key.as_bytes(), value)?;
        Ok(())
    }

    /// Every `(key, value)` under `prefix`, in key order.
    fn scan(&self, prefix: &str) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let prefix = prefix.as_bytes();
        let mut entries = Vec::new();

        let iter = self.db.prefix_iterator(prefix);
        for item in iter {
            let (key, value) = item?;
            if key.starts_with(prefix) {
                entries.push((key, value));
            } else {
                break;
            }
        }

        Ok(entries)
    }

    fn list_json<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        self.scan(prefix)?
            .into_iter()
            .map(|(_, value)| Ok(serde_json::from_slice(&value)?))
            .collect()
    }

    // --- Job queue ---

    /// Persist a job. Returns its sequence number.
    pub fn enqueue_job(&self, job: &Job) -> Result<u64> {
        let seq = self.next_job.fetch_add(1, Ordering::SeqCst);
        self.put_json(&job_key(seq), job)?;
        Ok(seq)
    }

    /// Jobs not yet completed, oldest first.
    pub fn pending_jobs(&self) -> Result<Vec<(u64, Job)>> {
        let mut jobs = Vec::new();
        for (key, value) in self.scan(JOB_PREFIX)? {
            let seq = std::str::from_utf8(&key[JOB_PREFIX.len()..])
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| {
                    Error::Storage(format!("bad job key {}", String::from_utf8_lossy(&key)))
                })?;
            jobs.push((seq, serde_json::from_slice(&value)?));
        }
        Ok(jobs)
    }

    /// Drop a job once it has run.
    pub fn complete_job(&self, seq: u64) -> Result<()> {
        self.db.delete(job_key(seq).as_bytes())?;
        Ok(())
    }

    /// Sequence number the next enqueued job will get.
    pub fn next_job_seq(&self) -> u64 {
        self.next_job.load(Ordering::SeqCst)
    }
}

/// Parse the `{slot}:{voter}` tail of a reverse-index key.
fn parse_index_tail(tail: &[u8]) -> Result<(Slot, VoterId)> {
    let bad = || Error::Storage(format!("bad index key tail {}", String::from_utf8_lossy(tail)));
    let tail = std::str::from_utf8(tail).map_err(|_| bad())?;
    let (tag, voter) = tail.split_once(':').ok_or_else(bad)?;
    let slot = Slot::from_tag(tag).ok_or_else(bad)?;
    let raw = voter.parse::<u64>().map_err(|_| bad())?;
    let voter = VoterId::new(raw).map_err(|_| bad())?;
    Ok((slot, voter))
}

impl VoteStore for Storage {
    fn voter(&self, id: VoterId) -> tally_ledger::Result<Option<Voter>> {
        Ok(self.get_json(&voter_key(id))?)
    }

    /// The record and its reverse-index entries go down in one batch.
    fn put_voter(&self, voter: &Voter) -> tally_ledger::Result<()> {
        let old: Option<Voter> = self.get_json(&voter_key(voter.id))?;
        let mut batch = WriteBatch::default();
        for (slot, topic, added) in index_changes(old.as_ref().map(|v| &v.votes), &voter.votes) {
            let key = index_key(topic, slot, voter.id);
            if added {
                batch.put(key.as_bytes(), b"");
            } else {
                batch.delete(key.as_bytes());
            }
        }
        let value = serde_json::to_vec(voter).map_err(Error::from)?;
        batch.put(voter_key(voter.id).as_bytes(), value);
        self.db.write(batch).map_err(Error::from)?;
        Ok(())
    }

    fn topic(&self, id: TopicId) -> tally_ledger::Result<Option<Topic>> {
        Ok(self.get_json(&topic_key(id))?)
    }

    fn put_topic(&self, topic: &Topic) -> tally_ledger::Result<()> {
        Ok(self.put_json(&topic_key(topic.id), topic)?)
    }

    fn topics(&self) -> tally_ledger::Result<Vec<Topic>> {
        Ok(self.list_json("topic:")?)
    }

    fn category(&self, id: CategoryId) -> tally_ledger::Result<Option<Category>> {
        Ok(self.get_json(&category_key(id))?)
    }

    fn put_category(&self, category: &Category) -> tally_ledger::Result<()> {
        Ok(self.put_json(&category_key(category.id), category)?)
    }

    fn categories(&self) -> tally_ledger::Result<Vec<Category>> {
        Ok(self.list_json("category:")?)
    }

    /// A RocksDB iterator reads from an implicit snapshot, so one prefix
    /// scan is a consistent view of the index.
    fn topic_votes(&self, topic: TopicId) -> tally_ledger::Result<TopicVotes> {
        let prefix = index_prefix(topic);
        let mut votes = TopicVotes::default();
        for (key, _) in self.scan(&prefix)? {
            let (slot, voter) = parse_index_tail(&key[prefix.len()..])?;
            votes.voters_mut(slot).insert(voter);
        }
        Ok(votes)
    }

    fn vote_count(&self, topic: TopicId) -> tally_ledger::Result<Option<i64>> {
        Ok(self.get_json(&count_key(topic))?)
    }

    fn set_vote_count(&self, topic: TopicId, count: i64) -> tally_ledger::Result<()> {
        Ok(self.put_json(&count_key(topic), &count)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tally_ledger::{VoteEngine, VotingSettings};
    use tempfile::tempdir;

    fn t(raw: u64) -> TopicId {
        TopicId::new(raw).unwrap()
    }

    fn voter(id: u64) -> Voter {
        Voter::new(VoterId::new(id).unwrap(), format!("user{}", id), 1)
    }

    #[test]
    fn voter_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let mut v = voter(7);
        v.name = Some("Seven".into());
        v.votes.insert(Slot::ActiveUp, t(3));
        storage.put_voter(&v).unwrap();

        let loaded = storage.voter(v.id).unwrap().unwrap();
        assert_eq!(v, loaded);
        assert!(storage.voter(VoterId::new(8).unwrap()).unwrap().is_none());
    }

    #[test]
    fn index_tracks_voter_writes() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let mut a = voter(1);
        a.votes.insert(Slot::ActiveUp, t(10));
        storage.put_voter(&a).unwrap();
        let mut b = voter(2);
        b.votes.insert(Slot::ActiveDown, t(10));
        b.votes.insert(Slot::ActiveUp, t(11));
        storage.put_voter(&b).unwrap();

        let votes = storage.topic_votes(t(10)).unwrap();
        assert!(votes.active_up.contains(&a.id));
        assert!(votes.active_down.contains(&b.id));
        assert_eq!(votes.net(), 0);

        a.votes.transfer(Slot::ActiveUp, Slot::ArchivedUp, t(10));
        storage.put_voter(&a).unwrap();
        let votes = storage.topic_votes(t(10)).unwrap();
        assert!(votes.active_up.is_empty());
        assert!(votes.archived_up.contains(&a.id));

        // neighbouring topic ids must not bleed into the scan
        let votes = storage.topic_votes(t(1)).unwrap();
        assert!(votes.is_empty());
        assert_eq!(storage.topic_votes(t(11)).unwrap().active_up.len(), 1);
    }

    #[test]
    fn topics_list_in_id_order() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let category = CategoryId::new(1).unwrap();

        for id in [12, 3, 100] {
            storage
                .put_topic(&Topic::new(t(id), format!("t{}", id), category))
                .unwrap();
        }
        let ids: Vec<u64> = storage.topics().unwrap().iter().map(|t| t.id.get()).collect();
        assert_eq!(ids, vec![3, 12, 100]);
    }

    #[test]
    fn counts_persist() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        assert_eq!(storage.vote_count(t(5)).unwrap(), None);
        storage.set_vote_count(t(5), -2).unwrap();
        assert_eq!(storage.vote_count(t(5)).unwrap(), Some(-2));
    }

    #[test]
    fn job_queue_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let storage = Storage::open(dir.path()).unwrap();
            let first = storage.enqueue_job(&Job::Release { topic: t(1) }).unwrap();
            let second = storage.enqueue_job(&Job::Reclaim { topic: t(2) }).unwrap();
            assert_eq!(second, first + 1);
            storage.complete_job(first).unwrap();
        }

        let storage = Storage::open(dir.path()).unwrap();
        let pending = storage.pending_jobs().unwrap();
        assert_eq!(pending, vec![(1, Job::Reclaim { topic: t(2) })]);
        assert_eq!(storage.next_job_seq(), 2);
        assert_eq!(storage.enqueue_job(&Job::Release { topic: t(3) }).unwrap(), 2);
    }

    #[test]
    fn engine_runs_on_rocksdb() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let mut category = Category::new(CategoryId::new(1).unwrap(), "Features".into());
        category.voting_enabled = true;
        storage.put_category(&category).unwrap();
        storage
            .put_topic(&Topic::new(t(9), "Dark mode".into(), category.id))
            .unwrap();
        let v = voter(4);
        storage.put_voter(&v).unwrap();

        let engine = VoteEngine::new(Arc::clone(&storage), VotingSettings::default());
        let receipt = engine.up_vote(v.id, t(9)).unwrap();
        assert!(receipt.recorded);
        assert_eq!(storage.vote_count(t(9)).unwrap(), Some(1));

        engine.release(t(9)).unwrap();
        assert_eq!(storage.vote_count(t(9)).unwrap(), Some(1));
        assert!(storage.topic_votes(t(9)).unwrap().archived_up.contains(&v.id));
    }
}

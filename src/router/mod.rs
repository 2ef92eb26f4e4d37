//! Core routing table implementation.

use time::OffsetDateTime;
use tracing::{debug, trace};

use crate::{
    config::Config,
    core::{
        bucket::{Bucket, BucketIndex},
        id::Id,
        traits::Contact,
    },
    error::Result,
};

#[cfg(feature = "sync")]
mod sync;
#[cfg(feature = "sync")]
#[cfg_attr(doc_cfg, doc(cfg(feature = "sync")))]
pub use sync::{RefreshHandle, SyncRoutingTable};

// The root is the first bucket allocated and is never moved.
const ROOT: BucketIndex = 0;

/// The outcome of an insertion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion<C> {
    /// The contact was stored.
    Inserted,
    /// A contact with the same identifier is already stored, it was left untouched.
    Exists,
    /// The bucket is full, can't split and none of its contacts are stale: the contact was
    /// dropped.
    Rejected,
    /// The bucket is full and can't split but some of its contacts are stale. The contact wasn't
    /// stored; the questionable contacts should be checked for liveness, removing the dead ones
    /// makes room for the candidate to be added again.
    Pending {
        questionable: Vec<C>,
        candidate: C,
    },
}

// A single insertion pass, a split requires the insertion to be retried against the reshaped
// trie.
pub(crate) enum Step<C> {
    Done(Insertion<C>),
    Split(C),
}

/// The core routing table implementation.
///
/// Buckets form a binary trie over the identifier space. Only the leaf on the path towards the
/// local identifier keeps splitting when full, every other leaf is pinned at the depth it was
/// created at. The region around the local identifier is thus maximally refined while the depth
/// of the trie stays bounded by [`Id::BITS`].
///
/// This type isn't synchronised, see [`SyncRoutingTable`] for a version suitable for sharing
/// between tasks.
#[derive(Debug, Clone)]
pub struct RoutingTable<C> {
    config: Config,
    // Cached conversion of the configured staleness threshold.
    stale_after: time::Duration,
    // The buckets, children reference each other by index into this list.
    buckets: Vec<Bucket<C>>,
}

impl<C: Contact> RoutingTable<C> {
    /// Creates a new, empty routing table.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            stale_after: config.stale_threshold(),
            config,
            buckets: vec![Bucket::new(OffsetDateTime::now_utc())],
        })
    }

    /// Returns this table's local identifier.
    pub fn local_id(&self) -> Id {
        self.config.local_id
    }

    /// Returns the maximum number of contacts per bucket.
    pub fn k(&self) -> usize {
        self.config.k
    }

    /// Returns the configuration the table was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    // Walks down from the root, returning the leaf responsible for the identifier and its depth.
    fn locate(&self, id: &Id) -> (BucketIndex, usize) {
        let mut index = ROOT;
        let mut bit_index = 0;

        while let Some(child) = self.buckets[index].near_child(id, bit_index) {
            index = child;
            bit_index += 1;
        }

        (index, bit_index)
    }

    fn leaf(&self, id: &Id) -> &Bucket<C> {
        let (index, _) = self.locate(id);
        &self.buckets[index]
    }

    /// Attempts to insert the contact, splitting buckets as necessary.
    ///
    /// A contact already present is left as is, use [`update`](Self::update) to mark it as seen.
    pub fn add(&mut self, contact: C) -> Insertion<C> {
        let mut contact = contact;

        loop {
            match self.step(contact, OffsetDateTime::now_utc()) {
                Step::Done(insertion) => return insertion,
                Step::Split(retry) => contact = retry,
            }
        }
    }

    /// Inserts each contact in turn, returning the number that were stored.
    pub fn load<I: IntoIterator<Item = C>>(&mut self, contacts: I) -> usize {
        contacts
            .into_iter()
            .map(|contact| self.add(contact))
            .filter(|insertion| matches!(insertion, Insertion::Inserted))
            .count()
    }

    pub(crate) fn step(&mut self, contact: C, now: OffsetDateTime) -> Step<C> {
        let id = contact.id();
        let (index, bit_index) = self.locate(&id);
        let bucket = &mut self.buckets[index];

        if bucket.has(&id) {
            return Step::Done(Insertion::Exists);
        }

        if bucket.len() < self.config.k {
            bucket.add(contact, now);
            return Step::Done(Insertion::Inserted);
        }

        // A leaf at the maximum depth has no bit left to split on.
        if bucket.dont_split() || bit_index >= Id::BITS {
            let questionable = bucket.stale(self.stale_after, now);

            if questionable.is_empty() {
                trace!(%id, bit_index, "bucket is full, dropping contact");
                return Step::Done(Insertion::Rejected);
            }

            debug!(
                %id,
                bit_index,
                questionable = questionable.len(),
                "bucket is full, liveness check required"
            );

            return Step::Done(Insertion::Pending {
                questionable,
                candidate: contact,
            });
        }

        let next = self.buckets.len();
        let children = self.buckets[index].split(bit_index, next, now);
        self.buckets.extend(children);

        // The branch diverging from the local identifier won't refine past this depth.
        let local_id = self.config.local_id;
        if let Some(far) = self.buckets[index].far_child(&local_id, bit_index) {
            self.buckets[far].set_dont_split();
        }

        debug!(bit_index, buckets = self.buckets.len(), "split bucket");

        Step::Split(contact)
    }

    /// Removes the contact if present, returning it.
    pub fn remove(&mut self, id: &Id) -> Option<C> {
        let (index, _) = self.locate(id);
        self.buckets[index].remove(id)
    }

    /// Returns `true` if the identifier is in the table.
    pub fn has(&self, id: &Id) -> bool {
        self.leaf(id).has(id)
    }

    /// Returns the contact stored for the identifier, if any.
    pub fn find(&self, id: &Id) -> Option<&C> {
        self.leaf(id).find(id)
    }

    /// Marks the identifier as just seen: the bucket covering it is touched along with the
    /// contact, if present. Returns `true` if the contact was found.
    pub fn update(&mut self, id: &Id) -> bool {
        let now = OffsetDateTime::now_utc();
        let (index, _) = self.locate(id);
        let bucket = &mut self.buckets[index];

        bucket.touch(now);
        match bucket.find_mut(id) {
            Some(contact) => {
                contact.touch(now);
                true
            }
            None => false,
        }
    }

    fn leaves(&self) -> impl Iterator<Item = &Bucket<C>> {
        self.buckets.iter().filter(|bucket| bucket.is_leaf())
    }

    /// Returns the number of contacts in the table.
    pub fn count(&self) -> usize {
        self.leaves().map(|bucket| bucket.len()).sum()
    }

    /// Returns `true` if the table holds no contacts.
    pub fn is_empty(&self) -> bool {
        self.leaves().all(|bucket| bucket.contacts().is_empty())
    }

    /// Returns all the contacts in the table, in no particular order.
    pub fn dump(&self) -> Vec<C> {
        self.leaves()
            .flat_map(|bucket| bucket.contacts().iter().cloned())
            .collect()
    }

    /// Returns up to `limit` contacts, sorted by ascending XOR distance to the target.
    ///
    /// The trie is walked depth-first, visiting the branch sharing the target's prefix before the
    /// other one, and the walk stops as soon as `limit` contacts were collected; the rest of the
    /// trie isn't scanned. Only the collected contacts are ranked.
    pub fn closest(&self, target: &Id, limit: usize) -> Vec<C> {
        let mut contacts = Vec::new();
        let mut stack = vec![(ROOT, 0)];

        while contacts.len() < limit {
            let Some((index, bit_index)) = stack.pop() else {
                break;
            };
            let bucket = &self.buckets[index];

            match (
                bucket.near_child(target, bit_index),
                bucket.far_child(target, bit_index),
            ) {
                (Some(near), Some(far)) => {
                    // Pushed last to be popped first.
                    stack.push((far, bit_index + 1));
                    stack.push((near, bit_index + 1));
                }
                _ => contacts.extend(bucket.contacts().iter().cloned()),
            }
        }

        // Stable, equal distances keep the order they were collected in.
        contacts.sort_by_cached_key(|contact| contact.id().distance(target));
        contacts.truncate(limit);

        contacts
    }

    /// Returns every contact that hasn't been touched within the staleness threshold.
    pub fn stale(&self) -> Vec<C> {
        let now = OffsetDateTime::now_utc();

        self.leaves()
            .flat_map(|bucket| bucket.stale(self.stale_after, now))
            .collect()
    }

    /// Returns the contacts of each non-empty bucket that hasn't changed within the staleness
    /// threshold, one list per bucket.
    pub fn stale_buckets(&self) -> Vec<Vec<C>> {
        let now = OffsetDateTime::now_utc();

        self.leaves()
            .filter(|bucket| !bucket.contacts().is_empty())
            .filter(|bucket| now - bucket.last_changed() >= self.stale_after)
            .map(|bucket| bucket.contacts().to_vec())
            .collect()
    }

    /// Returns the number of leaf buckets.
    pub fn bucket_count(&self) -> usize {
        self.leaves().count()
    }

    /// Returns the depth of the deepest bucket, 0 until the root splits.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut stack = vec![(ROOT, 0)];

        while let Some((index, bit_index)) = stack.pop() {
            match self.buckets[index].children() {
                Some((left, right)) => {
                    stack.push((left, bit_index + 1));
                    stack.push((right, bit_index + 1));
                }
                None => depth = depth.max(bit_index),
            }
        }

        depth
    }

    #[cfg(test)]
    fn leaf_for(&self, id: &Id) -> (&Bucket<C>, usize) {
        let (index, bit_index) = self.locate(id);
        (&self.buckets[index], bit_index)
    }
}

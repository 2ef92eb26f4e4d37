//! Routing trie nodes.

use time::{Duration, OffsetDateTime};

use crate::core::{id::Id, traits::Contact};

/// Position of a bucket in the table's arena.
pub(crate) type BucketIndex = usize;

#[derive(Debug, Clone)]
enum State<C> {
    // Holds the contacts in insertion order.
    Leaf(Vec<C>),
    // Children partitioning the range by one more bit: `left` for 0, `right` for 1.
    Internal {
        left: BucketIndex,
        right: BucketIndex,
    },
}

/// A node of the binary routing trie.
///
/// A bucket is either a leaf holding up to `k` contacts, or an internal node with exactly two
/// children. Children live in the same arena as their parent and are referenced by index, the
/// trie is only ever walked from the root down.
#[derive(Debug, Clone)]
pub(crate) struct Bucket<C> {
    state: State<C>,
    last_changed: OffsetDateTime,
    dont_split: bool,
}

impl<C: Contact> Bucket<C> {
    pub(crate) fn new(now: OffsetDateTime) -> Self {
        Self {
            state: State::Leaf(Vec::new()),
            last_changed: now,
            dont_split: false,
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.state, State::Leaf(_))
    }

    /// Returns the contacts held by a leaf, internal nodes hold none.
    pub(crate) fn contacts(&self) -> &[C] {
        match &self.state {
            State::Leaf(contacts) => contacts,
            State::Internal { .. } => &[],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.contacts().len()
    }

    pub(crate) fn last_changed(&self) -> OffsetDateTime {
        self.last_changed
    }

    pub(crate) fn dont_split(&self) -> bool {
        self.dont_split
    }

    /// Pins the bucket at its current depth, it will never split.
    pub(crate) fn set_dont_split(&mut self) {
        self.dont_split = true;
    }

    pub(crate) fn touch(&mut self, now: OffsetDateTime) {
        self.last_changed = now;
    }

    /// Appends the contact, capacity is checked by the caller.
    pub(crate) fn add(&mut self, contact: C, now: OffsetDateTime) {
        debug_assert!(self.is_leaf());

        if let State::Leaf(contacts) = &mut self.state {
            contacts.push(contact);
            self.last_changed = now;
        }
    }

    /// Turns the leaf into an internal node whose children will be stored at `next` and
    /// `next + 1`. The contacts are routed by their bit at `bit_index` and the two new leaves are
    /// returned (left first) for the caller to store.
    pub(crate) fn split(
        &mut self,
        bit_index: usize,
        next: BucketIndex,
        now: OffsetDateTime,
    ) -> [Bucket<C>; 2] {
        let mut left = Bucket::new(now);
        let mut right = Bucket::new(now);

        let state = std::mem::replace(
            &mut self.state,
            State::Internal {
                left: next,
                right: next + 1,
            },
        );

        if let State::Leaf(contacts) = state {
            for contact in contacts {
                if contact.id().bit(bit_index) {
                    right.add(contact, now);
                } else {
                    left.add(contact, now);
                }
            }
        }

        [left, right]
    }

    /// Returns the `(left, right)` children of an internal node.
    pub(crate) fn children(&self) -> Option<(BucketIndex, BucketIndex)> {
        match self.state {
            State::Internal { left, right } => Some((left, right)),
            State::Leaf(_) => None,
        }
    }

    /// Returns the child whose range contains `id`.
    pub(crate) fn near_child(&self, id: &Id, bit_index: usize) -> Option<BucketIndex> {
        self.children()
            .map(|(left, right)| if id.bit(bit_index) { right } else { left })
    }

    /// Returns the child whose range doesn't contain `id`.
    pub(crate) fn far_child(&self, id: &Id, bit_index: usize) -> Option<BucketIndex> {
        self.children()
            .map(|(left, right)| if id.bit(bit_index) { left } else { right })
    }

    fn index_of(&self, id: &Id) -> Option<usize> {
        self.contacts().iter().position(|contact| contact.id() == *id)
    }

    pub(crate) fn has(&self, id: &Id) -> bool {
        self.index_of(id).is_some()
    }

    pub(crate) fn find(&self, id: &Id) -> Option<&C> {
        self.index_of(id).map(|i| &self.contacts()[i])
    }

    pub(crate) fn find_mut(&mut self, id: &Id) -> Option<&mut C> {
        let i = self.index_of(id)?;
        match &mut self.state {
            State::Leaf(contacts) => contacts.get_mut(i),
            State::Internal { .. } => None,
        }
    }

    /// Removes the contact by swapping it with the last one, order isn't preserved.
    pub(crate) fn remove(&mut self, id: &Id) -> Option<C> {
        let i = self.index_of(id)?;
        match &mut self.state {
            State::Leaf(contacts) => Some(contacts.swap_remove(i)),
            State::Internal { .. } => None,
        }
    }

    /// Returns the contacts that haven't been touched for at least `threshold`.
    pub(crate) fn stale(&self, threshold: Duration, now: OffsetDateTime) -> Vec<C> {
        self.contacts()
            .iter()
            .filter(|contact| now - contact.last_changed() >= threshold)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::Node;

    fn node(raw: u16) -> Node {
        Node::new(Id::from_u16(raw), "127.0.0.1:1".parse().unwrap())
    }

    #[test]
    fn add_remove() {
        let now = OffsetDateTime::now_utc();
        let mut bucket = Bucket::new(now);

        for raw in 1..=3 {
            bucket.add(node(raw), now);
        }
        assert_eq!(bucket.len(), 3);
        assert!(bucket.has(&Id::from_u16(2)));

        // Removing the first entry moves the last one into its slot.
        assert!(bucket.remove(&Id::from_u16(1)).is_some());
        let ids: Vec<_> = bucket.contacts().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![Id::from_u16(3), Id::from_u16(2)]);

        // Absent identifiers are ignored.
        assert!(bucket.remove(&Id::from_u16(1)).is_none());
        assert_eq!(bucket.len(), 2);
    }

    #[test]
    fn split() {
        let now = OffsetDateTime::now_utc();
        let mut bucket = Bucket::new(now);

        // 1000..., 0100..., 1100...
        for raw in [0x8000, 0x4000, 0xc000] {
            bucket.add(node(raw), now);
        }

        let [left, right] = bucket.split(0, 1, now);

        assert!(!bucket.is_leaf());
        assert!(bucket.contacts().is_empty());
        assert_eq!(bucket.children(), Some((1, 2)));

        assert_eq!(left.len(), 1);
        assert!(left.has(&Id::from_u16(0x4000)));
        assert_eq!(right.len(), 2);
        assert!(right.has(&Id::from_u16(0x8000)));
        assert!(right.has(&Id::from_u16(0xc000)));
    }

    #[test]
    fn near_far_children() {
        let now = OffsetDateTime::now_utc();
        let mut bucket: Bucket<Node> = Bucket::new(now);

        // Leaves have no children.
        assert!(bucket.near_child(&Id::from_u16(0), 0).is_none());

        bucket.split(3, 1, now);

        // Bit 3 is set.
        let id = Id::from_u16(0x1000);
        assert_eq!(bucket.near_child(&id, 3), Some(2));
        assert_eq!(bucket.far_child(&id, 3), Some(1));

        // Bit 3 is unset.
        let id = Id::from_u16(0x2000);
        assert_eq!(bucket.near_child(&id, 3), Some(1));
        assert_eq!(bucket.far_child(&id, 3), Some(2));
    }

    #[test]
    fn stale() {
        let now = OffsetDateTime::now_utc();
        let mut bucket = Bucket::new(now);

        let addr = "127.0.0.1:1".parse().unwrap();
        let old = Node::with_last_changed(Id::from_u16(1), addr, now - Duration::minutes(20));
        let fresh = Node::with_last_changed(Id::from_u16(2), addr, now - Duration::minutes(1));
        bucket.add(old, now);
        bucket.add(fresh, now);

        let stale = bucket.stale(Duration::minutes(15), now);
        assert_eq!(stale, vec![old]);

        // A zero threshold considers everything stale.
        assert_eq!(bucket.stale(Duration::ZERO, now).len(), 2);

        // Touching the contact makes it fresh again.
        if let Some(contact) = bucket.find_mut(&Id::from_u16(1)) {
            contact.touch(now);
        }
        assert!(bucket.stale(Duration::minutes(15), now).is_empty());
    }
}

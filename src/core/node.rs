use std::net::SocketAddr;

use time::OffsetDateTime;

use crate::core::{
    id::{Distance, Id},
    traits::Contact,
};

/// A remote peer: the default [`Contact`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    id: Id,
    addr: SocketAddr,
    last_changed: OffsetDateTime,
}

impl Node {
    /// Creates a new node, last seen now.
    pub fn new(id: Id, addr: SocketAddr) -> Self {
        Self::with_last_changed(id, addr, OffsetDateTime::now_utc())
    }

    /// Creates a new node with an explicit timestamp, e.g. when restoring peers learnt earlier.
    pub fn with_last_changed(id: Id, addr: SocketAddr, last_changed: OffsetDateTime) -> Self {
        Self {
            id,
            addr,
            last_changed,
        }
    }

    /// Computes the XOR-based distance between this node and the target.
    pub fn distance(&self, target: &Id) -> Distance {
        self.id.distance(target)
    }
}

impl Contact for Node {
    fn id(&self) -> Id {
        self.id
    }

    fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn last_changed(&self) -> OffsetDateTime {
        self.last_changed
    }

    fn touch(&mut self, now: OffsetDateTime) {
        self.last_changed = now;
    }
}

use std::net::SocketAddr;

#[cfg(feature = "sync")]
use async_trait::async_trait;
use time::OffsetDateTime;

use crate::core::id::Id;

/// The capabilities the routing table requires of the peer records it stores.
///
/// Any record can be stored in the table as long as it exposes an identity, an address and a
/// timestamp the table can refresh. The table hands out clones of stored contacts, these should
/// be treated as snapshots; a stored contact's timestamp only changes through
/// [`update`](crate::RoutingTable::update).
pub trait Contact: Clone {
    /// Returns the contact's identifier, unique within a table.
    fn id(&self) -> Id;

    /// Returns the contact's network address.
    fn addr(&self) -> SocketAddr;

    /// Returns the last time the contact was created or touched.
    fn last_changed(&self) -> OffsetDateTime;

    /// Marks the contact as seen at `now`.
    fn touch(&mut self, now: OffsetDateTime);
}

/// Liveness check requested by the table when a full, non-splittable bucket has stale occupants
/// contending with a new arrival.
///
/// The table doesn't make any assumptions about timing or outcome. The implementation is expected
/// to probe the candidates and later call [`remove`](crate::SyncRoutingTable::remove) for the
/// dead ones and/or [`add`](crate::SyncRoutingTable::add) to admit the new contact.
#[cfg(feature = "sync")]
#[cfg_attr(doc_cfg, doc(cfg(feature = "sync")))]
#[async_trait]
pub trait OnPing<C: Send + 'static>: Send + Sync {
    async fn ping(&self, candidates: Vec<C>, contact: C);
}

/// Lookup requested by a refresh sweep for a bucket that hasn't changed within the staleness
/// threshold; new peers found in that region should be fed back through
/// [`add`](crate::SyncRoutingTable::add).
#[cfg(feature = "sync")]
#[cfg_attr(doc_cfg, doc(cfg(feature = "sync")))]
#[async_trait]
pub trait OnFindNode<C: Send + 'static>: Send + Sync {
    async fn find_node(&self, contacts: Vec<C>);
}

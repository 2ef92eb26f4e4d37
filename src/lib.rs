//! A Kademlia routing table backed by a self-balancing binary trie.
//!
//! Contacts are stored in buckets of at most `k` entries. A full bucket covering the local
//! identifier splits in two, while buckets covering the rest of the identifier space stay at the
//! depth they were created at. The table never performs any I/O: when a full bucket holds stale
//! contacts, or when a region of the identifier space hasn't changed in a while, it spawns the
//! [`OnPing`] or [`OnFindNode`] callbacks and leaves it to the caller to feed the outcome back
//! with [`remove`](SyncRoutingTable::remove) and [`add`](SyncRoutingTable::add).
//!
//! ## Features
//!
//! - `sync` (default): [`SyncRoutingTable`], a lock-guarded table dispatching the callbacks and
//!   running the periodic refresh on a tokio runtime.
//! - `codec`: `bincode` encoding for [`Id`] and [`Distance`].

#![cfg_attr(doc_cfg, feature(doc_cfg))]

pub mod config;
pub mod error;

mod core;
mod router;

#[cfg(feature = "sync")]
#[cfg_attr(doc_cfg, doc(cfg(feature = "sync")))]
pub use crate::{
    core::traits::{OnFindNode, OnPing},
    router::{RefreshHandle, SyncRoutingTable},
};
pub use crate::{
    config::Config,
    core::{
        id::{Distance, Id},
        node::Node,
        traits::Contact,
    },
    error::{Error, Result},
    router::{Insertion, RoutingTable},
};

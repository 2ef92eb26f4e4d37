#![cfg(feature = "sync")]

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use ktrie::{Config, Contact, Id, Node, OnFindNode, OnPing, SyncRoutingTable};
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
use tracing::*;
use tracing_subscriber::{fmt, EnvFilter};

#[allow(dead_code)]
pub fn enable_tracing() {
    fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

/// Builds an identifier whose first byte is `prefix`, the rest is zeroed.
#[allow(dead_code)]
pub fn id(prefix: u8) -> Id {
    let mut bytes = [0u8; Id::BYTES];
    bytes[0] = prefix;

    Id::new(bytes)
}

#[allow(dead_code)]
pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[allow(dead_code)]
pub fn node(prefix: u8) -> Node {
    Node::new(id(prefix), addr(prefix.into()))
}

/// A node last seen `age` ago.
#[allow(dead_code)]
pub fn aged_node(prefix: u8, age: Duration) -> Node {
    Node::with_last_changed(id(prefix), addr(prefix.into()), OffsetDateTime::now_utc() - age)
}

/// Records every callback invocation.
#[allow(dead_code)]
#[derive(Default)]
pub struct Recorder {
    pub pings: Mutex<Vec<(Vec<Node>, Node)>>,
    pub find_nodes: Mutex<Vec<Vec<Node>>>,
}

#[async_trait]
impl OnPing<Node> for Recorder {
    async fn ping(&self, candidates: Vec<Node>, contact: Node) {
        debug!(candidates = candidates.len(), id = %contact.id(), "ping");
        self.pings.lock().push((candidates, contact));
    }
}

#[async_trait]
impl OnFindNode<Node> for Recorder {
    async fn find_node(&self, contacts: Vec<Node>) {
        debug!(contacts = contacts.len(), "find node");
        self.find_nodes.lock().push(contacts);
    }
}

#[allow(dead_code)]
pub fn recorded_table(config: Config) -> (SyncRoutingTable<Node>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let rt = SyncRoutingTable::new(config, recorder.clone(), recorder.clone()).unwrap();

    (rt, recorder)
}

/// Answers liveness checks as a transport that finds every candidate dead would: the candidates
/// are removed and the new contact admitted.
#[allow(dead_code)]
#[derive(Default)]
pub struct Evictor {
    pub routing_table: Mutex<Option<SyncRoutingTable<Node>>>,
}

#[async_trait]
impl OnPing<Node> for Evictor {
    async fn ping(&self, candidates: Vec<Node>, contact: Node) {
        // Clone out of the lock, the table shouldn't be called while holding it.
        let rt = self.routing_table.lock().clone();

        if let Some(rt) = rt {
            for candidate in candidates {
                rt.remove(&candidate.id());
            }
            rt.add(contact);
        }
    }
}

#[async_trait]
impl OnFindNode<Node> for Evictor {
    async fn find_node(&self, _contacts: Vec<Node>) {}
}

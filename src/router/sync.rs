use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::RwLock;
use time::OffsetDateTime;
use tokio::{
    runtime::Handle,
    sync::oneshot,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, trace};

use crate::{
    config::Config,
    core::{
        id::Id,
        traits::{Contact, OnFindNode, OnPing},
    },
    error::{Error, Result},
    router::{Insertion, RoutingTable, Step},
};

struct Shared<C: Contact + Send + Sync + 'static> {
    routing_table: RwLock<RoutingTable<C>>,
    on_ping: Arc<dyn OnPing<C>>,
    on_find_node: Arc<dyn OnFindNode<C>>,
    // Callbacks are spawned here, never awaited.
    runtime: Handle,
}

#[cfg_attr(doc_cfg, doc(cfg(feature = "sync")))]
/// A routing table implementation suitable for use in async contexts.
///
/// It wraps [`RoutingTable`] behind a single read/write lock and dispatches the liveness and
/// refresh callbacks as detached tasks. Cloning is cheap, clones share the same table.
pub struct SyncRoutingTable<C: Contact + Send + Sync + 'static> {
    shared: Arc<Shared<C>>,
}

impl<C: Contact + Send + Sync + 'static> Clone for SyncRoutingTable<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Contact + Send + Sync + 'static> fmt::Debug for SyncRoutingTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rt_g = self.shared.routing_table.read();

        f.debug_struct("SyncRoutingTable")
            .field("local_id", &rt_g.local_id())
            .field("contacts", &rt_g.count())
            .field("buckets", &rt_g.bucket_count())
            .finish()
    }
}

impl<C: Contact + Send + Sync + 'static> SyncRoutingTable<C> {
    /// Creates a new routing table, must be called from within a tokio runtime.
    pub fn new(
        config: Config,
        on_ping: Arc<dyn OnPing<C>>,
        on_find_node: Arc<dyn OnFindNode<C>>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        Ok(Self {
            shared: Arc::new(Shared {
                routing_table: RwLock::new(RoutingTable::new(config)?),
                on_ping,
                on_find_node,
                runtime,
            }),
        })
    }

    pub fn local_id(&self) -> Id {
        self.shared.routing_table.read().local_id()
    }

    pub fn config(&self) -> Config {
        self.shared.routing_table.read().config().clone()
    }

    /// Attempts to insert the contact.
    ///
    /// If the contact lands in a full bucket that can't split but holds stale contacts, the ping
    /// callback is spawned with those contacts and the candidate, and [`Insertion::Pending`] is
    /// returned without storing the candidate.
    pub fn add(&self, contact: C) -> Insertion<C> {
        let mut contact = contact;

        loop {
            // The guard is dropped at the end of the statement: another writer may get in between
            // a split and the retry.
            let step = self
                .shared
                .routing_table
                .write()
                .step(contact, OffsetDateTime::now_utc());

            match step {
                Step::Split(retry) => contact = retry,
                Step::Done(insertion) => {
                    if let Insertion::Pending {
                        questionable,
                        candidate,
                    } = &insertion
                    {
                        self.dispatch_ping(questionable.clone(), candidate.clone());
                    }

                    return insertion;
                }
            }
        }
    }

    /// Inserts each contact in turn, returning the number that were stored.
    pub fn load<I: IntoIterator<Item = C>>(&self, contacts: I) -> usize {
        contacts
            .into_iter()
            .map(|contact| self.add(contact))
            .filter(|insertion| matches!(insertion, Insertion::Inserted))
            .count()
    }

    pub fn remove(&self, id: &Id) -> Option<C> {
        self.shared.routing_table.write().remove(id)
    }

    pub fn has(&self, id: &Id) -> bool {
        self.shared.routing_table.read().has(id)
    }

    /// Returns a snapshot of the contact stored for the identifier.
    pub fn find(&self, id: &Id) -> Option<C> {
        self.shared.routing_table.read().find(id).cloned()
    }

    /// Marks the identifier as just seen, returning `true` if the contact is stored.
    pub fn update(&self, id: &Id) -> bool {
        self.shared.routing_table.write().update(id)
    }

    pub fn count(&self) -> usize {
        self.shared.routing_table.read().count()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.routing_table.read().is_empty()
    }

    pub fn dump(&self) -> Vec<C> {
        self.shared.routing_table.read().dump()
    }

    /// See [`RoutingTable::closest`].
    pub fn closest(&self, target: &Id, limit: usize) -> Vec<C> {
        self.shared.routing_table.read().closest(target, limit)
    }

    /// Returns every contact that hasn't been touched within the staleness threshold.
    pub fn stale(&self) -> Vec<C> {
        self.shared.routing_table.read().stale()
    }

    pub fn bucket_count(&self) -> usize {
        self.shared.routing_table.read().bucket_count()
    }

    pub fn depth(&self) -> usize {
        self.shared.routing_table.read().depth()
    }

    /// Spawns the find node callback for every non-empty bucket that hasn't changed within the
    /// staleness threshold, returning the number of callbacks spawned.
    pub fn refresh(&self) -> usize {
        let rt_g = self.shared.routing_table.read();
        let stale_buckets = rt_g.stale_buckets();
        let n = stale_buckets.len();

        for contacts in stale_buckets {
            let on_find_node = Arc::clone(&self.shared.on_find_node);
            self.shared
                .runtime
                .spawn(async move { on_find_node.find_node(contacts).await });
        }

        trace!(stale_buckets = n, "refreshed routing table");

        n
    }

    /// Starts the periodic refresh task, which runs until the returned handle is dropped.
    ///
    /// The first sweep happens one interval after the call. The task stops when the returned
    /// handle is stopped or dropped, or once every clone of the table has been dropped; keep the
    /// handle alive for as long as the table should be refreshed.
    #[must_use = "dropping the handle stops the refresh task"]
    pub fn spawn_refresh(&self) -> RefreshHandle {
        let period = self.shared.routing_table.read().config().refresh_interval;
        let shared = Arc::downgrade(&self.shared);
        let (stop_tx, stop_rx) = oneshot::channel();

        debug!(?period, "starting the refresh task");
        let task = self
            .shared
            .runtime
            .spawn(Self::refresh_loop(shared, period, stop_rx));

        RefreshHandle {
            stop: stop_tx,
            task,
        }
    }

    async fn refresh_loop(
        shared: Weak<Shared<C>>,
        period: std::time::Duration,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                // Resolves on an explicit stop as well as when the handle is dropped.
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let Some(shared) = shared.upgrade() else {
                        break;
                    };

                    SyncRoutingTable { shared }.refresh();
                }
            }
        }

        debug!("stopped the refresh task");
    }

    fn dispatch_ping(&self, questionable: Vec<C>, candidate: C) {
        let on_ping = Arc::clone(&self.shared.on_ping);
        self.shared
            .runtime
            .spawn(async move { on_ping.ping(questionable, candidate).await });
    }
}

/// Handle to the periodic refresh task, dropping it stops the task.
#[cfg_attr(doc_cfg, doc(cfg(feature = "sync")))]
#[must_use = "dropping the handle stops the refresh task"]
#[derive(Debug)]
pub struct RefreshHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Signals the task to stop and waits for it to finish.
    pub async fn stop(self) {
        // The task may already be gone if the table was dropped.
        let _ = self.stop.send(());
        let _ = self.task.await;
    }

    /// Returns `true` if the task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::core::node::Node;

    #[derive(Default)]
    struct Counter {
        pings: AtomicUsize,
        find_nodes: AtomicUsize,
    }

    #[async_trait]
    impl OnPing<Node> for Counter {
        async fn ping(&self, _candidates: Vec<Node>, _contact: Node) {
            self.pings.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl OnFindNode<Node> for Counter {
        async fn find_node(&self, _contacts: Vec<Node>) {
            self.find_nodes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn table(config: Config) -> (SyncRoutingTable<Node>, Arc<Counter>) {
        let counter = Arc::new(Counter::default());
        let rt = SyncRoutingTable::new(config, counter.clone(), counter.clone()).unwrap();

        (rt, counter)
    }

    #[test]
    fn no_runtime() {
        let counter = Arc::new(Counter::default());

        assert!(matches!(
            SyncRoutingTable::<Node>::new(Config::default(), counter.clone(), counter),
            Err(Error::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn clones_share_the_table() {
        let (rt, _) = table(Config::default());
        let clone = rt.clone();

        let id = Id::rand();
        assert_eq!(
            rt.add(Node::new(id, "127.0.0.1:1".parse().unwrap())),
            Insertion::Inserted
        );
        assert!(clone.has(&id));
        assert_eq!(clone.count(), 1);
    }

    #[tokio::test]
    async fn refresh_task_exits_when_table_dropped() {
        let config = Config::default().with_refresh_interval(Duration::from_millis(10));
        let (rt, _) = table(config);

        let handle = rt.spawn_refresh();
        drop(rt);

        // The next tick fails to upgrade the table reference.
        tokio::time::timeout(Duration::from_secs(1), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn refresh_runs_while_handle_held() {
        let config = Config::default()
            .with_stale_after(Duration::ZERO)
            .with_refresh_interval(Duration::from_millis(10));
        let (rt, counter) = table(config);
        rt.add(Node::new(Id::rand(), "127.0.0.1:1".parse().unwrap()));

        let handle = rt.spawn_refresh();

        tokio::time::timeout(Duration::from_secs(1), async {
            while counter.find_nodes.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(!handle.is_finished());

        handle.stop().await;
    }

    #[tokio::test]
    async fn refresh_task_exits_when_handle_dropped() {
        let config = Config::default()
            .with_stale_after(Duration::ZERO)
            .with_refresh_interval(Duration::from_millis(10));
        let (rt, counter) = table(config);
        rt.add(Node::new(Id::rand(), "127.0.0.1:1".parse().unwrap()));

        drop(rt.spawn_refresh());

        // The sender is gone, the task exits before its first sweep.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.find_nodes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refresh_task_stops() {
        let config = Config::default().with_refresh_interval(Duration::from_millis(10));
        let (rt, _) = table(config);

        let handle = rt.spawn_refresh();
        assert!(!handle.is_finished());

        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .unwrap();
    }
}

use log::{debug, info, warn};
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Message;
use crate::blockchain::ConsensusRules;
use crate::config::SimConfig;
use crate::node::{Node, NodeSnapshot};
use crate::node_id::generate_unique;

/// node id -> ids of the peers it talks to
pub type Topology = BTreeMap<String, Vec<String>>;

/// In-process stand-in for a peer-to-peer network.
///
/// Nodes push outgoing messages into a shared channel; a router task pulls
/// them and schedules one delayed delivery per recipient. Deliveries are
/// independent tasks, so arrival order across links is not preserved.
pub struct Network {
    rules: ConsensusRules,
    nodes: RwLock<BTreeMap<String, Arc<Node>>>,
    topology: RwLock<Topology>,
    outbox: mpsc::UnboundedSender<Message>,
    runtime: Handle,
}

impl Network {
    /// Must be called from inside a tokio runtime; the router, mining
    /// sessions and deliveries all run on it.
    pub fn new(rules: ConsensusRules) -> Arc<Self> {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let runtime = Handle::current();
        let network = Arc::new(Self {
            rules,
            nodes: RwLock::new(BTreeMap::new()),
            topology: RwLock::new(Topology::new()),
            outbox,
            runtime: runtime.clone(),
        });
        runtime.spawn(route(Arc::downgrade(&network), inbox));
        network
    }

    /// `count` nodes with generated ids, every node peered with every other.
    pub fn fully_connected(count: usize, rules: ConsensusRules) -> Arc<Self> {
        let network = Self::new(rules);
        for id in generate_unique(count) {
            network.add_node(id);
        }
        network.connect_fully();
        info!("created fully connected network of {} nodes", count);
        network
    }

    pub fn config(&self) -> &Arc<SimConfig> {
        self.rules.config()
    }

    pub fn rules(&self) -> &ConsensusRules {
        &self.rules
    }

    /// Register a node with its own genesis block. Adding an id twice
    /// returns the existing node.
    pub fn add_node(&self, id: impl Into<String>) -> Arc<Node> {
        let id = id.into();
        let mut nodes = self.nodes.write().expect("rwlock poisoned");
        if let Some(existing) = nodes.get(&id) {
            warn!("node {} already exists", id);
            return existing.clone();
        }
        let node = Node::new(
            id.clone(),
            self.rules.clone(),
            self.outbox.clone(),
            self.runtime.clone(),
        );
        nodes.insert(id, node.clone());
        node
    }

    /// Install `topology` and push each node's peer list to it. Nodes not
    /// listed end up with no peers.
    pub fn set_topology(&self, topology: Topology) {
        for node in self.nodes() {
            let peers = topology.get(node.id()).cloned().unwrap_or_default();
            node.set_peers(peers);
        }
        *self.topology.write().expect("rwlock poisoned") = topology;
    }

    /// Peer every registered node with every other one.
    pub fn connect_fully(&self) {
        let ids = self.node_ids();
        let topology = ids
            .iter()
            .map(|id| {
                let peers = ids.iter().filter(|p| *p != id).cloned().collect();
                (id.clone(), peers)
            })
            .collect();
        self.set_topology(topology);
    }

    pub fn topology(&self) -> Topology {
        self.topology.read().expect("rwlock poisoned").clone()
    }

    pub fn node(&self, id: &str) -> Option<Arc<Node>> {
        self.nodes.read().expect("rwlock poisoned").get(id).cloned()
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes
            .read()
            .expect("rwlock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes
            .read()
            .expect("rwlock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, NodeSnapshot> {
        self.nodes()
            .into_iter()
            .map(|node| (node.id().to_string(), node.snapshot()))
            .collect()
    }

    pub fn start_all_mining(&self) {
        for node in self.nodes() {
            node.start_mining();
        }
    }

    pub fn stop_all_mining(&self) {
        for node in self.nodes() {
            node.stop_mining();
        }
    }

    /// Schedule delivery of `message`: to its recipient if it names one,
    /// otherwise a separately delayed copy to every peer of the sender.
    /// Messages for unknown nodes are logged and dropped.
    pub fn send(&self, message: Message) {
        match message.recipient().map(str::to_owned) {
            Some(to) => match self.node(&to) {
                Some(node) => self.deliver(node, message),
                None => warn!(
                    "dropping {} from {}: unknown node {}",
                    message.kind(),
                    message.sender(),
                    to
                ),
            },
            None => {
                let peers = self
                    .topology
                    .read()
                    .expect("rwlock poisoned")
                    .get(message.sender())
                    .cloned()
                    .unwrap_or_default();
                if peers.is_empty() {
                    debug!("{} from {} has no peers to reach", message.kind(), message.sender());
                }
                for peer in peers {
                    match self.node(&peer) {
                        Some(node) => self.deliver(node, message.clone()),
                        None => warn!("dropping {} for unknown peer {}", message.kind(), peer),
                    }
                }
            }
        }
    }

    /// Every `interval`, every node asks each of its peers for its height.
    /// Probing stops when the handle is cancelled or dropped.
    pub fn start_periodic_height_probing(self: &Arc<Self>, interval: Duration) -> ProbeHandle {
        let network = Arc::downgrade(self);
        let task = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(network) = network.upgrade() else {
                    break;
                };
                for node in network.nodes() {
                    node.request_height_from_peers();
                }
            }
        });
        ProbeHandle { task }
    }

    fn deliver(&self, node: Arc<Node>, message: Message) {
        let delay = self.random_delay();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            node.handle_message(message);
        });
    }

    fn random_delay(&self) -> Duration {
        let cfg = self.config();
        let ms = rand::thread_rng().gen_range(cfg.min_network_delay_ms..=cfg.max_network_delay_ms);
        Duration::from_millis(ms)
    }
}

async fn route(network: Weak<Network>, mut inbox: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = inbox.recv().await {
        let Some(network) = network.upgrade() else {
            break;
        };
        network.send(message);
    }
    debug!("network router stopped");
}

/// Cancels periodic height probing when cancelled or dropped.
#[derive(Debug)]
pub struct ProbeHandle {
    task: JoinHandle<()>,
}

impl ProbeHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

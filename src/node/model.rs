use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::blockchain::{Block, Blockchain, ConsensusRules};
use crate::error::ValidationError;
use crate::mining::{Miner, OnBlockMined};
use crate::network::Message;
use crate::transaction::UtxoSet;

/// Read-only view of a node for observers.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub node_id: String,
    pub blocks: Vec<Block>,
    pub utxo: UtxoSet,
    pub is_mining: bool,
    pub peer_ids: Vec<String>,
}

/// A full node: one ledger, one miner, and the handlers that react to
/// network messages.
///
/// Every ledger change happens under the `blockchain` lock, and the tip
/// publish plus miner restart that follow it happen before the lock is
/// released. Lock order is `blockchain` then the miner's session.
pub struct Node {
    id: String,
    blockchain: Mutex<Blockchain>,
    miner: Miner,
    peer_ids: RwLock<Vec<String>>,
    mining_enabled: AtomicBool,
    tip: watch::Sender<String>,
    outbox: mpsc::UnboundedSender<Message>,
}

impl Node {
    /// Create a node holding its own genesis block. Outgoing messages are
    /// pushed to `outbox`; mining sessions are spawned on `runtime`.
    pub fn new(
        id: impl Into<String>,
        rules: ConsensusRules,
        outbox: mpsc::UnboundedSender<Message>,
        runtime: Handle,
    ) -> Arc<Self> {
        let id = id.into();
        let blockchain = Blockchain::new(id.clone(), rules.clone());
        let (tip, _) = watch::channel(blockchain.tip().hash.clone());

        Arc::new_cyclic(|weak: &Weak<Node>| {
            let weak = weak.clone();
            let on_block_mined: OnBlockMined = Arc::new(move |block| {
                if let Some(node) = weak.upgrade() {
                    node.handle_mined_block(block);
                }
            });
            Self {
                miner: Miner::new(id.clone(), rules.config().clone(), on_block_mined, runtime),
                id,
                blockchain: Mutex::new(blockchain),
                peer_ids: RwLock::new(Vec::new()),
                mining_enabled: AtomicBool::new(false),
                tip,
                outbox,
            }
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peer_ids(&self) -> Vec<String> {
        self.peer_ids.read().expect("rwlock poisoned").clone()
    }

    /// Replace the peer list. Also decides who receives redistribution
    /// shares in blocks mined from now on.
    pub fn set_peers(&self, peer_ids: Vec<String>) {
        self.miner.set_peer_ids(&peer_ids);
        *self.peer_ids.write().expect("rwlock poisoned") = peer_ids;
    }

    pub fn is_mining(&self) -> bool {
        self.miner.is_mining()
    }

    /// Number of blocks including genesis.
    pub fn chain_length(&self) -> usize {
        self.ledger().len()
    }

    pub fn height(&self) -> u64 {
        self.ledger().height()
    }

    pub fn tip_hash(&self) -> String {
        self.tip.borrow().clone()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.ledger().blocks().to_vec()
    }

    pub fn utxo(&self) -> UtxoSet {
        self.ledger().utxo().clone()
    }

    /// Run `f` against the ledger while holding its lock.
    pub fn with_blockchain<R>(&self, f: impl FnOnce(&Blockchain) -> R) -> R {
        f(&self.ledger())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.ledger().validate()
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let (blocks, utxo) = {
            let bc = self.ledger();
            (bc.blocks().to_vec(), bc.utxo().clone())
        };
        NodeSnapshot {
            node_id: self.id.clone(),
            blocks,
            utxo,
            is_mining: self.is_mining(),
            peer_ids: self.peer_ids(),
        }
    }

    /// Keep mining on the tip until `stop_mining`, restarting after every
    /// chain change.
    pub fn start_mining(&self) {
        self.mining_enabled.store(true, Ordering::Release);
        let bc = self.ledger();
        self.mine_on(bc.tip());
    }

    pub fn stop_mining(&self) {
        self.mining_enabled.store(false, Ordering::Release);
        self.miner.stop_mining();
    }

    pub fn handle_message(&self, message: Message) {
        match message {
            Message::BlockAnnouncement {
                from_node_id,
                block,
            } => self.receive_block(&from_node_id, block),
            Message::ChainRequest { from_node_id, .. } => {
                let blocks = self.blocks();
                self.send(Message::ChainResponse {
                    from_node_id: self.id.clone(),
                    to_node_id: from_node_id,
                    blocks,
                });
            }
            Message::ChainResponse {
                from_node_id,
                blocks,
                ..
            } => self.receive_chain(&from_node_id, blocks),
            Message::HeightRequest { from_node_id, .. } => {
                let height = self.chain_length() as u64;
                self.send(Message::HeightResponse {
                    from_node_id: self.id.clone(),
                    to_node_id: from_node_id,
                    height,
                });
            }
            Message::HeightResponse {
                from_node_id,
                height,
                ..
            } => {
                let ours = self.chain_length() as u64;
                if height > ours {
                    debug!(
                        "[{}] {} reports {} blocks (have {}), requesting chain",
                        self.id, from_node_id, height, ours
                    );
                    self.request_chain(from_node_id);
                }
            }
        }
    }

    /// Try to extend the chain with a block announced by a peer.
    pub fn receive_block(&self, from: &str, block: Block) {
        let mut bc = self.ledger();
        match bc.add_block(block) {
            Ok(()) => {
                info!(
                    "[{}] accepted block #{} from {}",
                    self.id,
                    bc.height(),
                    from
                );
                self.restart_on(&bc);
            }
            Err(e) => debug!("[{}] ignored block from {}: {}", self.id, from, e),
        }
    }

    /// Adopt a peer's chain if it is valid and strictly longer than ours.
    pub fn receive_chain(&self, from: &str, blocks: Vec<Block>) {
        let mut bc = self.ledger();
        match bc.replace_chain(blocks) {
            Ok(()) => {
                info!(
                    "[{}] adopted chain of {} blocks from {}",
                    self.id,
                    bc.len(),
                    from
                );
                self.restart_on(&bc);
            }
            Err(e) => debug!("[{}] kept own chain over {}'s: {}", self.id, from, e),
        }
    }

    pub fn request_chain(&self, peer_id: String) {
        self.send(Message::ChainRequest {
            from_node_id: self.id.clone(),
            to_node_id: peer_id,
        });
    }

    pub fn request_height_from_peers(&self) {
        for peer_id in self.peer_ids() {
            self.send(Message::HeightRequest {
                from_node_id: self.id.clone(),
                to_node_id: peer_id,
            });
        }
    }

    fn handle_mined_block(&self, block: Block) {
        let mut bc = self.ledger();
        match bc.add_block(block.clone()) {
            Ok(()) => {
                self.restart_on(&bc);
                drop(bc);
                self.send(Message::BlockAnnouncement {
                    from_node_id: self.id.clone(),
                    block,
                });
            }
            Err(e) => {
                debug!("[{}] discarded own block #{}: {}", self.id, block.height(), e);
                self.mine_on(bc.tip());
            }
        }
    }

    /// Publish the new tip (stale sessions see it at their next batch), then
    /// start a fresh session on it.
    fn restart_on(&self, bc: &Blockchain) {
        self.tip.send_replace(bc.tip().hash.clone());
        self.miner.stop_mining();
        self.mine_on(bc.tip());
    }

    fn mine_on(&self, tip: &Block) {
        if self.mining_enabled.load(Ordering::Acquire) {
            self.miner.start_mining(tip, self.tip.subscribe());
        }
    }

    fn send(&self, message: Message) {
        if self.outbox.send(message).is_err() {
            warn!("[{}] network is gone, message dropped", self.id);
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Blockchain> {
        self.blockchain.lock().expect("mutex poisoned")
    }
}

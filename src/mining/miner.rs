use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::blockchain::Block;
use crate::config::SimConfig;
use crate::transaction::{Transaction, create_coinbase, create_redistribution};

/// Invoked with each block the miner finds. The miner never touches a ledger;
/// the receiver decides whether to append the block.
pub type OnBlockMined = Arc<dyn Fn(Block) + Send + Sync>;

/// Background Proof-of-Work search for one node.
///
/// Each `start_mining` call opens a session: a tokio task that tries
/// `mining_batch_size` nonces, yields, and repeats. A session ends when it
/// finds a block, when `stop_mining` clears its flag, or when the tip it is
/// building on changes.
pub struct Miner {
    node_id: String,
    config: Arc<SimConfig>,
    peer_ids: RwLock<Vec<String>>,
    session: Mutex<Option<Arc<AtomicBool>>>,
    on_block_mined: OnBlockMined,
    runtime: Handle,
}

impl Miner {
    pub fn new(
        node_id: impl Into<String>,
        config: Arc<SimConfig>,
        on_block_mined: OnBlockMined,
        runtime: Handle,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            config,
            peer_ids: RwLock::new(Vec::new()),
            session: Mutex::new(None),
            on_block_mined,
            runtime,
        }
    }

    pub fn set_peer_ids(&self, peer_ids: &[String]) {
        *self.peer_ids.write().expect("rwlock poisoned") = peer_ids.to_vec();
    }

    pub fn is_mining(&self) -> bool {
        self.session
            .lock()
            .expect("mutex poisoned")
            .as_ref()
            .is_some_and(|active| active.load(Ordering::Acquire))
    }

    /// Coinbase first, then the redistribution of that coinbase to every peer
    /// (omitted when there are no peers).
    pub fn build_block_transactions(&self, height: u64) -> Vec<Transaction> {
        let coinbase = create_coinbase(&self.node_id, height, &self.config);
        let peers = self.peer_ids.read().expect("rwlock poisoned");
        let redistribution = coinbase.txid.as_deref().and_then(|txid| {
            create_redistribution(txid, &self.node_id, &peers, height, &self.config)
        });
        let mut txs = vec![coinbase];
        txs.extend(redistribution);
        txs
    }

    /// Start searching for a block on top of `previous`. `tip` carries the
    /// hash of the node's current tip; once it differs from `previous` the
    /// session abandons its work. No-op while a session is active.
    pub fn start_mining(&self, previous: &Block, tip: watch::Receiver<String>) -> bool {
        let mut session = self.session.lock().expect("mutex poisoned");
        if session
            .as_ref()
            .is_some_and(|active| active.load(Ordering::Acquire))
        {
            return false;
        }

        let transactions = self.build_block_transactions(previous.height() + 1);
        let block = Block::template(Some(previous), transactions, &self.config);
        let active = Arc::new(AtomicBool::new(true));
        *session = Some(active.clone());

        debug!(
            "[{}] mining block #{} on {}",
            self.node_id,
            block.height(),
            block.header.previous_header_hash
        );
        self.runtime.spawn(search(
            self.node_id.clone(),
            block,
            self.config.mining_batch_size,
            active,
            tip,
            self.on_block_mined.clone(),
        ));
        true
    }

    /// Request the current session to stop. The task notices at its next
    /// batch boundary.
    pub fn stop_mining(&self) {
        if let Some(active) = self.session.lock().expect("mutex poisoned").take() {
            active.store(false, Ordering::Release);
        }
    }
}

async fn search(
    node_id: String,
    mut block: Block,
    batch_size: u32,
    active: Arc<AtomicBool>,
    tip: watch::Receiver<String>,
    on_block_mined: OnBlockMined,
) {
    loop {
        if !active.load(Ordering::Acquire) {
            debug!("[{}] mining of block #{} cancelled", node_id, block.height());
            return;
        }
        if *tip.borrow() != block.header.previous_header_hash {
            debug!(
                "[{}] tip moved, abandoning block #{}",
                node_id,
                block.height()
            );
            active.store(false, Ordering::Release);
            return;
        }

        if block.mine_batch(batch_size) {
            // A concurrent stop wins over a late find.
            if active.swap(false, Ordering::AcqRel) {
                info!(
                    "[{}] mined block #{} hash={} nonce={}",
                    node_id,
                    block.height(),
                    block.hash,
                    block.header.nonce
                );
                on_block_mined(block);
            }
            return;
        }

        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn config(ceiling: String) -> Arc<SimConfig> {
        Arc::new(SimConfig {
            ceiling,
            mining_batch_size: 64,
            ..SimConfig::default()
        })
    }

    fn easy() -> Arc<SimConfig> {
        config(format!("0fff{}", "f".repeat(60)))
    }

    /// No hash is below zero, so a session never finishes on its own.
    fn impossible() -> Arc<SimConfig> {
        config("0".repeat(64))
    }

    fn miner_with_channel(cfg: Arc<SimConfig>) -> (Miner, mpsc::UnboundedReceiver<Block>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let on_mined: OnBlockMined = Arc::new(move |block| {
            let _ = tx.send(block);
        });
        (Miner::new("alpha", cfg, on_mined, Handle::current()), rx)
    }

    #[tokio::test]
    async fn finds_block_on_previous() {
        let cfg = easy();
        let (miner, mut found) = miner_with_channel(cfg.clone());
        miner.set_peer_ids(&["bravo".to_string()]);
        let genesis = Block::genesis("alpha", &cfg);
        let (_tip_tx, tip_rx) = watch::channel(genesis.hash.clone());

        assert!(miner.start_mining(&genesis, tip_rx));
        let block = tokio::time::timeout(Duration::from_secs(10), found.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(block.height(), 1);
        assert_eq!(block.header.previous_header_hash, genesis.hash);
        assert_eq!(block.transactions.len(), 2);
        assert!(block.meets_ceiling());
        assert_eq!(block.hash, block.compute_hash());
        assert!(!miner.is_mining());
    }

    #[tokio::test]
    async fn start_is_noop_while_mining() {
        let cfg = impossible();
        let (miner, _found) = miner_with_channel(cfg.clone());
        let genesis = Block::genesis("alpha", &cfg);
        let (_tip_tx, tip_rx) = watch::channel(genesis.hash.clone());

        assert!(miner.start_mining(&genesis, tip_rx.clone()));
        assert!(miner.is_mining());
        assert!(!miner.start_mining(&genesis, tip_rx));
        miner.stop_mining();
    }

    #[tokio::test]
    async fn stop_cancels_session() {
        let cfg = impossible();
        let (miner, mut found) = miner_with_channel(cfg.clone());
        let genesis = Block::genesis("alpha", &cfg);
        let (_tip_tx, tip_rx) = watch::channel(genesis.hash.clone());

        miner.start_mining(&genesis, tip_rx);
        tokio::task::yield_now().await;
        miner.stop_mining();
        assert!(!miner.is_mining());

        // The task exits and drops its callback, closing the channel.
        drop(miner);
        let next = tokio::time::timeout(Duration::from_secs(5), found.recv())
            .await
            .unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn abandons_work_when_tip_moves() {
        let cfg = impossible();
        let (miner, _found) = miner_with_channel(cfg.clone());
        let genesis = Block::genesis("alpha", &cfg);
        let (tip_tx, tip_rx) = watch::channel(genesis.hash.clone());

        miner.start_mining(&genesis, tip_rx);
        tip_tx.send_replace("another-tip".to_string());

        tokio::time::timeout(Duration::from_secs(5), async {
            while miner.is_mining() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn transactions_without_peers_are_coinbase_only() {
        let (miner, _found) = miner_with_channel(easy());
        assert_eq!(miner.build_block_transactions(3).len(), 1);

        miner.set_peer_ids(&["bravo".to_string(), "charlie".to_string()]);
        let txs = miner.build_block_transactions(3);
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[1].outputs.len(), 3);
    }
}

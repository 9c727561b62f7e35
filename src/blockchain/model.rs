use log::{debug, info};

use super::Block;
use super::validation::ConsensusRules;
use crate::error::ValidationError;
use crate::transaction::UtxoSet;

/// One node's ledger: its block list and the UTXO set derived from it.
///
/// `blocks` and `utxo` only change together, through `add_block` or
/// `replace_chain`; a rejected call leaves both untouched.
#[derive(Debug, Clone)]
pub struct Blockchain {
    node_id: String,
    blocks: Vec<Block>,
    utxo: UtxoSet,
    rules: ConsensusRules,
}

impl Blockchain {
    /// Initialize a ledger holding this node's own genesis block.
    pub fn new(node_id: impl Into<String>, rules: ConsensusRules) -> Self {
        let node_id = node_id.into();
        let genesis = Block::genesis(&node_id, rules.config());
        let utxo = UtxoSet::rebuild(&genesis.transactions, rules.reward_sentinel())
            .expect("Genesis coinbase always carries a txid and spends nothing");
        Self {
            node_id,
            blocks: vec![genesis],
            utxo,
            rules,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn rules(&self) -> &ConsensusRules {
        &self.rules
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn utxo(&self) -> &UtxoSet {
        &self.utxo
    }

    /// Return the last block in the chain.
    pub fn tip(&self) -> &Block {
        self.blocks
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    pub fn height(&self) -> u64 {
        self.tip().header.height
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_by_height(&self, height: u64) -> Option<&Block> {
        usize::try_from(height).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.hash == hash)
    }

    /// Re-run whole-chain validation over the current blocks.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.rules.validate_chain(&self.blocks).map(|_| ())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Append `block` on top of the current tip. Genesis blocks are only
    /// ever installed by `new`.
    pub fn add_block(&mut self, mut block: Block) -> Result<(), ValidationError> {
        if block.is_genesis() {
            debug!("[{}] refusing to append a genesis block", self.node_id);
            return Err(ValidationError::GenesisAppend);
        }
        if block.hash.is_empty() {
            block.seal();
        } else {
            block.verify_cached_hash()?;
        }

        let next = self
            .rules
            .validate_block(&block, Some(self.tip()), &self.utxo)
            .inspect_err(|e| {
                debug!(
                    "[{}] rejected block #{} {}: {}",
                    self.node_id, block.header.height, block.hash, e
                )
            })?;

        info!(
            "[{}] appended block #{} hash={} nonce={}",
            self.node_id, block.header.height, block.hash, block.header.nonce
        );
        self.utxo = next;
        self.blocks.push(block);
        Ok(())
    }

    /// Adopt `candidate` if it is strictly longer than the current chain and
    /// valid from its genesis. Equal-length chains never replace ours.
    pub fn replace_chain(&mut self, mut candidate: Vec<Block>) -> Result<(), ValidationError> {
        if candidate.len() <= self.blocks.len() {
            debug!(
                "[{}] ignoring chain of {} blocks (have {})",
                self.node_id,
                candidate.len(),
                self.blocks.len()
            );
            return Err(ValidationError::NotLonger {
                candidate: candidate.len(),
                current: self.blocks.len(),
            });
        }

        let utxo = self.rules.validate_chain(&candidate).inspect_err(|e| {
            debug!(
                "[{}] rejected chain of {} blocks: {}",
                self.node_id,
                candidate.len(),
                e
            )
        })?;

        for block in candidate.iter_mut().filter(|b| b.hash.is_empty()) {
            block.seal();
        }
        info!(
            "[{}] replaced chain: {} -> {} blocks",
            self.node_id,
            self.blocks.len(),
            candidate.len()
        );
        self.blocks = candidate;
        self.utxo = utxo;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::validation::tests::{easy_config, mined_child};
    use crate::config::{COIN, SimConfig};
    use crate::transaction::{create_coinbase, create_redistribution, output_id};
    use std::sync::Arc;

    fn ledger(node: &str) -> Blockchain {
        Blockchain::new(node, ConsensusRules::new(easy_config()))
    }

    fn grow(bc: &mut Blockchain, blocks: usize) {
        for _ in 0..blocks {
            let next = mined_child(bc.rules(), bc.tip(), bc.node_id());
            bc.add_block(next).unwrap();
        }
    }

    #[test]
    fn starts_with_own_genesis() {
        let bc = ledger("alpha");
        let cfg = bc.rules().config().clone();
        assert_eq!(bc.len(), 1);
        assert_eq!(bc.height(), 0);
        assert_eq!(bc.tip().header.previous_header_hash, cfg.genesis_prev_sentinel);
        assert_eq!(bc.utxo().len(), 1);

        let coinbase_txid = bc.tip().transactions[0].txid.clone().unwrap();
        let out = bc.utxo().get(&output_id(&coinbase_txid, 0)).unwrap();
        assert_eq!(out.value, cfg.block_reward);
        assert_eq!(out.owner_id, "alpha");
        assert!(bc.is_valid());
    }

    #[test]
    fn own_blocks_are_accepted_for_any_valid_split() {
        let peers: Vec<String> = (1..=4).map(|i| format!("peer-{i}")).collect();
        let splits = [(0, 4 * COIN), (10_000, 4 * COIN), (5_000, 4), (1, 3)];
        for (bps, reward) in splits {
            let cfg = Arc::new(SimConfig {
                redistribution_bps: bps,
                block_reward: reward,
                ..(*easy_config()).clone()
            });
            assert!(cfg.validate().is_ok());
            let mut bc = Blockchain::new("alpha", ConsensusRules::new(cfg.clone()));

            let coinbase = create_coinbase("alpha", 1, &cfg);
            let txid = coinbase.txid.clone().unwrap();
            let mut txs = vec![coinbase];
            txs.extend(create_redistribution(&txid, "alpha", &peers, 1, &cfg));
            let mut block = Block::template(Some(bc.tip()), txs, &cfg);
            block.mine();

            assert_eq!(bc.add_block(block), Ok(()), "bps={bps} reward={reward}");
            assert_eq!(bc.len(), 2);
        }
    }

    #[test]
    fn add_block_advances_both_halves() {
        let mut bc = ledger("alpha");
        grow(&mut bc, 2);
        assert_eq!(bc.len(), 3);
        assert_eq!(bc.height(), 2);
        // genesis coinbase + (two shares + change) per block
        assert_eq!(bc.utxo().len(), 1 + 2 * 3);
        assert_eq!(bc.utxo().balance_of("peer-a"), 2 * u128::from(COIN));
        assert!(bc.is_valid());
    }

    #[test]
    fn rejected_block_leaves_state_unchanged() {
        let mut bc = ledger("alpha");
        grow(&mut bc, 1);
        let before_blocks = bc.blocks().to_vec();
        let before_utxo = bc.utxo().clone();

        let mut bad = mined_child(bc.rules(), bc.tip(), "alpha");
        bad.header.nonce = bad.header.nonce.wrapping_add(1);
        assert!(bc.add_block(bad).is_err());

        let stale = mined_child(bc.rules(), &before_blocks[0], "alpha");
        assert!(bc.add_block(stale).is_err());

        assert_eq!(bc.blocks(), before_blocks.as_slice());
        assert_eq!(bc.utxo(), &before_utxo);
    }

    #[test]
    fn refuses_genesis_append() {
        let mut bc = ledger("alpha");
        let foreign = ledger("bravo").tip().clone();
        assert_eq!(bc.add_block(foreign), Err(ValidationError::GenesisAppend));
        assert_eq!(bc.len(), 1);
    }

    #[test]
    fn fills_missing_hash_on_append() {
        let mut bc = ledger("alpha");
        let mut next = mined_child(bc.rules(), bc.tip(), "alpha");
        let expected = next.hash.clone();
        next.hash.clear();
        bc.add_block(next).unwrap();
        assert_eq!(bc.tip().hash, expected);
        assert!(bc.block_by_hash(&expected).is_some());
    }

    #[test]
    fn replace_chain_requires_strictly_longer() {
        let mut ours = ledger("alpha");
        grow(&mut ours, 2);
        let mut theirs = ledger("bravo");
        grow(&mut theirs, 2);

        let before = ours.blocks().to_vec();
        let before_utxo = ours.utxo().clone();
        assert!(matches!(
            ours.replace_chain(theirs.blocks().to_vec()),
            Err(ValidationError::NotLonger {
                candidate: 3,
                current: 3
            })
        ));
        assert!(ours.replace_chain(theirs.blocks()[..2].to_vec()).is_err());
        assert_eq!(ours.blocks(), before.as_slice());
        assert_eq!(ours.utxo(), &before_utxo);

        grow(&mut theirs, 1);
        ours.replace_chain(theirs.blocks().to_vec()).unwrap();
        assert_eq!(ours.blocks(), theirs.blocks());
        assert_eq!(ours.utxo(), theirs.utxo());
        assert_eq!(ours.node_id(), "alpha");
    }

    #[test]
    fn replace_chain_rejects_invalid_longer_chain() {
        let mut ours = ledger("alpha");
        let mut theirs = ledger("bravo");
        grow(&mut theirs, 3);
        let mut forged = theirs.blocks().to_vec();
        forged[2].transactions[0].outputs[0].value += 1;

        assert!(ours.replace_chain(forged).is_err());
        assert_eq!(ours.len(), 1);
    }

    #[test]
    fn lookups() {
        let mut bc = ledger("alpha");
        grow(&mut bc, 2);
        let second = bc.blocks()[1].clone();
        assert_eq!(bc.block_by_height(1), Some(&second));
        assert_eq!(bc.block_by_hash(&second.hash), Some(&second));
        assert!(bc.block_by_height(5).is_none());
        assert!(bc.block_by_hash("nope").is_none());
    }
}

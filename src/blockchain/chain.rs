use chrono::Utc;

use super::block::Block;
use super::validation::ConsensusRules;
use crate::error::ValidationError;
use crate::transaction::UtxoSet;

impl ConsensusRules {
    /// Validate a whole candidate chain from its genesis, replaying the ledger
    /// block by block. Returns the ledger at the chain's tip.
    ///
    /// Any height-0 block whose previous hash is the genesis sentinel is an
    /// acceptable genesis: every node mints its own, and chains built on a
    /// different node's genesis must still be adoptable.
    pub fn validate_chain(&self, chain: &[Block]) -> Result<UtxoSet, ValidationError> {
        self.validate_chain_at(chain, Utc::now().timestamp_millis())
    }

    pub fn is_valid_chain(&self, chain: &[Block]) -> bool {
        self.validate_chain(chain).is_ok()
    }

    pub fn validate_chain_at(&self, chain: &[Block], now_ms: i64) -> Result<UtxoSet, ValidationError> {
        let genesis = chain.first().ok_or(ValidationError::EmptyChain)?;
        if genesis.header.height != 0 {
            return Err(ValidationError::InvalidGenesis("height must be 0"));
        }
        if genesis.header.previous_header_hash != self.config().genesis_prev_sentinel {
            return Err(ValidationError::InvalidGenesis(
                "previous hash must be the genesis sentinel",
            ));
        }

        for (i, block) in chain.iter().enumerate() {
            if block.header.height != i as u64 {
                return Err(ValidationError::HeightMismatch {
                    expected: i as u64,
                    found: block.header.height,
                });
            }
            block.verify_cached_hash().map_err(|e| in_block(i as u64, e))?;
        }

        let mut utxo = UtxoSet::rebuild(&genesis.transactions, self.reward_sentinel())
            .map_err(|e| in_block(0, e))?;

        for pair in chain.windows(2) {
            let (prev, block) = (&pair[0], &pair[1]);
            let height = block.header.height;
            utxo = self
                .validate_block_at(block, Some(prev), &utxo, now_ms)
                .map_err(|e| in_block(height, e))?;
            if block.header.timestamp < prev.header.timestamp {
                return Err(ValidationError::NonMonotonicTimestamp { height });
            }
        }

        Ok(utxo)
    }
}

fn in_block(height: u64, err: ValidationError) -> ValidationError {
    ValidationError::Block {
        height,
        source: Box::new(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::validation::tests::{easy_config, genesis_and_ledger, mined_child};

    fn chain_of(rules: &ConsensusRules, miner: &str, len: usize) -> Vec<Block> {
        let (genesis, _) = genesis_and_ledger(rules, miner);
        let mut chain = vec![genesis];
        while chain.len() < len {
            let next = mined_child(rules, chain.last().unwrap(), miner);
            chain.push(next);
        }
        chain
    }

    #[test]
    fn accepts_valid_chain_and_returns_tip_ledger() {
        let rules = ConsensusRules::new(easy_config());
        let chain = chain_of(&rules, "alpha", 4);
        let utxo = rules.validate_chain(&chain).unwrap();
        let all_txs = chain.iter().flat_map(|b| b.transactions.iter());
        assert_eq!(
            utxo,
            UtxoSet::rebuild(all_txs, rules.reward_sentinel()).unwrap()
        );
    }

    #[test]
    fn rejects_empty_chain() {
        let rules = ConsensusRules::new(easy_config());
        assert_eq!(rules.validate_chain(&[]), Err(ValidationError::EmptyChain));
    }

    #[test]
    fn accepts_foreign_genesis() {
        let rules = ConsensusRules::new(easy_config());
        assert!(rules.is_valid_chain(&chain_of(&rules, "bravo", 3)));
        assert!(rules.is_valid_chain(&chain_of(&rules, "charlie", 1)));
    }

    #[test]
    fn rejects_genesis_with_wrong_sentinel() {
        let rules = ConsensusRules::new(easy_config());
        let mut chain = chain_of(&rules, "alpha", 1);
        chain[0].header.previous_header_hash = "abc".into();
        chain[0].seal();
        assert!(matches!(
            rules.validate_chain(&chain),
            Err(ValidationError::InvalidGenesis(_))
        ));
    }

    #[test]
    fn rejects_height_gap() {
        let rules = ConsensusRules::new(easy_config());
        let mut chain = chain_of(&rules, "alpha", 3);
        chain.remove(1);
        assert!(matches!(
            rules.validate_chain(&chain),
            Err(ValidationError::HeightMismatch {
                expected: 1,
                found: 2
            })
        ));
    }

    #[test]
    fn rejects_stale_cached_hash() {
        let rules = ConsensusRules::new(easy_config());
        let mut chain = chain_of(&rules, "alpha", 3);
        chain[2].hash = "00".repeat(32);
        assert!(matches!(
            rules.validate_chain(&chain),
            Err(ValidationError::Block { height: 2, .. })
        ));
    }

    #[test]
    fn rejects_tampered_middle_block() {
        let rules = ConsensusRules::new(easy_config());
        let mut chain = chain_of(&rules, "alpha", 4);
        chain[2].transactions[1].outputs[0].owner_id = "mallory".into();
        assert!(matches!(
            rules.validate_chain(&chain),
            Err(ValidationError::Block { height: 2, .. })
        ));
    }

    #[test]
    fn rejects_timestamp_going_backwards() {
        let rules = ConsensusRules::new(easy_config());
        let mut chain = chain_of(&rules, "alpha", 2);
        let earlier = chain[0].header.timestamp - 1_000;
        let mut tip = chain.pop().unwrap();
        tip.header.timestamp = earlier;
        tip.mine();
        chain.push(tip);
        assert_eq!(
            rules.validate_chain(&chain),
            Err(ValidationError::NonMonotonicTimestamp { height: 1 })
        );
    }
}

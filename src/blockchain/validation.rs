use chrono::Utc;
use log::debug;
use std::sync::Arc;

use super::block::{Block, digest_transactions};
use crate::config::{SimConfig, strip_hex_prefix};
use crate::error::ValidationError;
use crate::hashing::is_hash_below_ceiling;
use crate::transaction::{Transaction, TransactionVerifier, UtxoSet, validate_transaction};

/// Consensus rules shared by every ledger on the network: the parameter
/// bundle plus the optional transaction verifier layered on top of the
/// baseline checks.
#[derive(Debug, Clone)]
pub struct ConsensusRules {
    config: Arc<SimConfig>,
    verifier: Option<Arc<dyn TransactionVerifier>>,
}

impl ConsensusRules {
    pub fn new(config: Arc<SimConfig>) -> Self {
        Self {
            config,
            verifier: None,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TransactionVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn config(&self) -> &Arc<SimConfig> {
        &self.config
    }

    pub fn reward_sentinel(&self) -> &str {
        &self.config.reward_sentinel
    }

    /// Baseline rules, then the verifier (regular transactions only).
    pub fn validate_transaction(
        &self,
        tx: &Transaction,
        utxo: &UtxoSet,
        block_height: u64,
        is_coinbase: bool,
    ) -> Result<(), ValidationError> {
        validate_transaction(tx, utxo, block_height, is_coinbase, &self.config)?;
        match &self.verifier {
            Some(verifier) if !is_coinbase => verifier.verify(tx, utxo),
            _ => Ok(()),
        }
    }

    /// Validate `block` on top of `previous` against the ledger `utxo`, using
    /// the current wall clock for the timestamp window.
    ///
    /// On success returns the ledger advanced by the block's transactions;
    /// `utxo` itself is never modified.
    pub fn validate_block(
        &self,
        block: &Block,
        previous: Option<&Block>,
        utxo: &UtxoSet,
    ) -> Result<UtxoSet, ValidationError> {
        self.validate_block_at(block, previous, utxo, Utc::now().timestamp_millis())
    }

    pub fn is_valid_block(&self, block: &Block, previous: Option<&Block>, utxo: &UtxoSet) -> bool {
        self.validate_block(block, previous, utxo).is_ok()
    }

    /// `validate_block` with an explicit validation time (unix ms).
    ///
    /// Without a `previous` block the block is treated as a trusted genesis:
    /// it must sit at height 0 and skips linkage and Proof-of-Work.
    pub fn validate_block_at(
        &self,
        block: &Block,
        previous: Option<&Block>,
        utxo: &UtxoSet,
        now_ms: i64,
    ) -> Result<UtxoSet, ValidationError> {
        let header = &block.header;
        let sentinel = self.reward_sentinel();

        let (coinbase, rest) = block
            .transactions
            .split_first()
            .ok_or(ValidationError::EmptyBlock)?;

        // Outputs created earlier in the block are spendable by later
        // transactions, so the snapshot advances one transaction at a time.
        let mut working = utxo.clone();
        self.validate_transaction(coinbase, &working, header.height, true)
            .and_then(|_| working.apply_in_place(coinbase, sentinel))
            .map_err(|e| in_transaction(0, e))?;
        for (i, tx) in rest.iter().enumerate() {
            self.validate_transaction(tx, &working, header.height, false)
                .and_then(|_| working.apply_in_place(tx, sentinel))
                .map_err(|e| in_transaction(i + 1, e))?;
        }

        if digest_transactions(&block.transactions) != header.transactions_digest {
            return Err(ValidationError::TransactionsDigestMismatch);
        }

        match previous {
            Some(prev) => {
                let expected = prev.header.digest();
                if header.previous_header_hash != expected {
                    return Err(ValidationError::PreviousHashMismatch {
                        expected,
                        found: header.previous_header_hash.clone(),
                    });
                }
                if header.height != prev.header.height + 1 {
                    return Err(ValidationError::HeightMismatch {
                        expected: prev.header.height + 1,
                        found: header.height,
                    });
                }
            }
            None if header.height != 0 => {
                return Err(ValidationError::HeightMismatch {
                    expected: 0,
                    found: header.height,
                });
            }
            None => {}
        }

        let drift = self.config.max_timestamp_drift_ms;
        if header.timestamp > now_ms.saturating_add(drift)
            || header.timestamp < now_ms.saturating_sub(drift)
        {
            return Err(ValidationError::TimestampOutOfRange {
                timestamp: header.timestamp,
                now: now_ms,
            });
        }

        if previous.is_some() {
            if !same_magnitude(&header.ceiling, &self.config.ceiling) {
                return Err(ValidationError::CeilingMismatch(header.ceiling.clone()));
            }
            let hash = header.digest();
            if !is_hash_below_ceiling(&hash, &header.ceiling) {
                return Err(ValidationError::InsufficientWork(hash));
            }
        }

        Ok(working)
    }
}

fn in_transaction(index: usize, err: ValidationError) -> ValidationError {
    debug!("transaction {} rejected: {}", index, err);
    ValidationError::Transaction {
        index,
        source: Box::new(err),
    }
}

fn same_magnitude(a: &str, b: &str) -> bool {
    let norm = |s: &str| strip_hex_prefix(s).trim_start_matches('0').to_ascii_lowercase();
    norm(a) == norm(b)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transaction::{
        TxInput, TxOutput, compute_txid, create_coinbase, create_redistribution, output_id,
    };

    pub(crate) fn easy_config() -> Arc<SimConfig> {
        Arc::new(SimConfig {
            ceiling: format!("0x0fff{}", "f".repeat(60)),
            ..SimConfig::default()
        })
    }

    pub(crate) fn genesis_and_ledger(rules: &ConsensusRules, miner: &str) -> (Block, UtxoSet) {
        let genesis = Block::genesis(miner, rules.config());
        let utxo = UtxoSet::rebuild(&genesis.transactions, rules.reward_sentinel()).unwrap();
        (genesis, utxo)
    }

    /// Coinbase + redistribution block on top of `prev`, mined.
    pub(crate) fn mined_child(rules: &ConsensusRules, prev: &Block, miner: &str) -> Block {
        let cfg = rules.config();
        let height = prev.height() + 1;
        let coinbase = create_coinbase(miner, height, cfg);
        let peers = vec!["peer-a".to_string(), "peer-b".to_string()];
        let redistribution = create_redistribution(
            coinbase.txid.as_deref().unwrap(),
            miner,
            &peers,
            height,
            cfg,
        )
        .unwrap();
        let mut block = Block::template(Some(prev), vec![coinbase, redistribution], cfg);
        block.mine();
        block
    }

    #[test]
    fn accepts_well_formed_block() {
        let rules = ConsensusRules::new(easy_config());
        let (genesis, utxo) = genesis_and_ledger(&rules, "alpha");
        let block = mined_child(&rules, &genesis, "alpha");
        let next = rules.validate_block(&block, Some(&genesis), &utxo).unwrap();
        // genesis coinbase + two peer shares + change
        assert_eq!(next.len(), 4);
        assert_eq!(utxo.len(), 1);
    }

    #[test]
    fn same_block_output_chaining_is_allowed() {
        let rules = ConsensusRules::new(easy_config());
        let (genesis, utxo) = genesis_and_ledger(&rules, "alpha");
        let block = mined_child(&rules, &genesis, "alpha");
        let coinbase_output = output_id(block.transactions[0].txid.as_deref().unwrap(), 0);
        assert!(!utxo.contains(&coinbase_output));
        assert!(rules.is_valid_block(&block, Some(&genesis), &utxo));
    }

    #[test]
    fn rejects_empty_block() {
        let rules = ConsensusRules::new(easy_config());
        let (genesis, utxo) = genesis_and_ledger(&rules, "alpha");
        let mut block = Block::template(Some(&genesis), vec![], rules.config());
        block.mine();
        assert_eq!(
            rules.validate_block(&block, Some(&genesis), &utxo),
            Err(ValidationError::EmptyBlock)
        );
    }

    #[test]
    fn rejects_wrong_reward() {
        let cfg = easy_config();
        let rules = ConsensusRules::new(cfg.clone());
        let (genesis, utxo) = genesis_and_ledger(&rules, "alpha");
        let inputs = vec![TxInput::new(cfg.reward_sentinel.clone())];
        let outputs = vec![TxOutput::new(0, "alpha", cfg.block_reward * 2)];
        let greedy = Transaction {
            txid: Some(compute_txid(&inputs, &outputs, 1)),
            inputs,
            outputs,
            timestamp: 0,
        };
        let mut block = Block::template(Some(&genesis), vec![greedy], &cfg);
        block.mine();
        assert!(matches!(
            rules.validate_block(&block, Some(&genesis), &utxo),
            Err(ValidationError::Transaction { index: 0, .. })
        ));
    }

    #[test]
    fn rejects_spend_of_missing_output() {
        let cfg = easy_config();
        let rules = ConsensusRules::new(cfg.clone());
        let (genesis, utxo) = genesis_and_ledger(&rules, "alpha");
        let coinbase = create_coinbase("alpha", 1, &cfg);
        let inputs = vec![TxInput::new("nowhere-0")];
        let outputs = vec![TxOutput::new(0, "bob", 1)];
        let bogus = Transaction {
            txid: Some(compute_txid(&inputs, &outputs, 1)),
            inputs,
            outputs,
            timestamp: 0,
        };
        let mut block = Block::template(Some(&genesis), vec![coinbase, bogus], &cfg);
        block.mine();
        let err = rules.validate_block(&block, Some(&genesis), &utxo).unwrap_err();
        assert_eq!(
            err,
            ValidationError::Transaction {
                index: 1,
                source: Box::new(ValidationError::UnknownInput("nowhere-0".into())),
            }
        );
    }

    #[test]
    fn rejects_transactions_digest_mismatch() {
        let rules = ConsensusRules::new(easy_config());
        let (genesis, utxo) = genesis_and_ledger(&rules, "alpha");
        let mut block = mined_child(&rules, &genesis, "alpha");
        block.transactions.truncate(1);
        assert_eq!(
            rules.validate_block(&block, Some(&genesis), &utxo),
            Err(ValidationError::TransactionsDigestMismatch)
        );
    }

    #[test]
    fn rejects_wrong_parent() {
        let rules = ConsensusRules::new(easy_config());
        let (genesis, utxo) = genesis_and_ledger(&rules, "alpha");
        let (other_genesis, _) = genesis_and_ledger(&rules, "bravo");
        let block = mined_child(&rules, &other_genesis, "alpha");
        assert!(matches!(
            rules.validate_block(&block, Some(&genesis), &utxo),
            Err(ValidationError::PreviousHashMismatch { .. })
        ));
    }

    #[test]
    fn rejects_height_gap() {
        let cfg = easy_config();
        let rules = ConsensusRules::new(cfg.clone());
        let (genesis, utxo) = genesis_and_ledger(&rules, "alpha");
        let mut block = Block::template(
            Some(&genesis),
            vec![create_coinbase("alpha", 2, &cfg)],
            &cfg,
        );
        block.header.height = 2;
        block.mine();
        assert_eq!(
            rules.validate_block(&block, Some(&genesis), &utxo),
            Err(ValidationError::HeightMismatch {
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn timestamp_window() {
        let rules = ConsensusRules::new(easy_config());
        let (genesis, utxo) = genesis_and_ledger(&rules, "alpha");
        let block = mined_child(&rules, &genesis, "alpha");
        let ts = block.header.timestamp;
        let two_hours = 2 * 60 * 60 * 1000;

        assert!(
            rules
                .validate_block_at(&block, Some(&genesis), &utxo, ts)
                .is_ok()
        );
        assert!(
            rules
                .validate_block_at(&block, Some(&genesis), &utxo, ts - two_hours)
                .is_ok()
        );
        assert!(matches!(
            rules.validate_block_at(&block, Some(&genesis), &utxo, ts - two_hours - 1),
            Err(ValidationError::TimestampOutOfRange { .. })
        ));
        assert!(matches!(
            rules.validate_block_at(&block, Some(&genesis), &utxo, ts + two_hours + 1),
            Err(ValidationError::TimestampOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_unmined_block() {
        let cfg = Arc::new(SimConfig {
            ceiling: format!("0000000f{}", "f".repeat(56)),
            ..SimConfig::default()
        });
        let rules = ConsensusRules::new(cfg.clone());
        let (genesis, utxo) = genesis_and_ledger(&rules, "alpha");
        let mut block = Block::template(
            Some(&genesis),
            vec![create_coinbase("alpha", 1, &cfg)],
            &cfg,
        );
        // find a nonce that misses the ceiling (almost every nonce does)
        while block.meets_ceiling() {
            block.header.nonce += 1;
        }
        block.seal();
        assert!(matches!(
            rules.validate_block(&block, Some(&genesis), &utxo),
            Err(ValidationError::InsufficientWork(_))
        ));
    }

    #[test]
    fn rejects_self_declared_easy_ceiling() {
        let cfg = easy_config();
        let rules = ConsensusRules::new(cfg.clone());
        let (genesis, utxo) = genesis_and_ledger(&rules, "alpha");
        let mut block = Block::template(
            Some(&genesis),
            vec![create_coinbase("alpha", 1, &cfg)],
            &cfg,
        );
        block.header.ceiling = "f".repeat(64);
        block.mine();
        assert!(matches!(
            rules.validate_block(&block, Some(&genesis), &utxo),
            Err(ValidationError::CeilingMismatch(_))
        ));
    }

    #[test]
    fn genesis_without_previous_skips_work_check() {
        let cfg = Arc::new(SimConfig {
            ceiling: format!("00000000{}", "f".repeat(56)),
            ..SimConfig::default()
        });
        let rules = ConsensusRules::new(cfg);
        let genesis = Block::genesis("alpha", rules.config());
        assert!(rules.is_valid_block(&genesis, None, &UtxoSet::new()));

        let (g, utxo) = genesis_and_ledger(&rules, "alpha");
        let orphan = Block::template(
            Some(&g),
            vec![create_coinbase("alpha", 1, rules.config())],
            rules.config(),
        );
        assert!(matches!(
            rules.validate_block(&orphan, None, &utxo),
            Err(ValidationError::HeightMismatch {
                expected: 0,
                found: 1
            })
        ));
    }

    #[test]
    fn ceiling_comparison_ignores_prefix_and_padding() {
        assert!(same_magnitude("0x00ff", "ff"));
        assert!(same_magnitude("0X0FF", "0x00FF"));
        assert!(!same_magnitude("0x0100", "ff"));
    }
}

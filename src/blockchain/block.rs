use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::error::ValidationError;
use crate::hashing::{is_hash_below_ceiling, sha256_hex};
use crate::transaction::{Transaction, create_coinbase};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub transactions_digest: String,
    pub timestamp: i64, // Unix milliseconds (UTC)
    pub previous_header_hash: String,
    pub ceiling: String,
    pub nonce: u64, // Proof-of-Work nonce
    pub height: u64,
}

impl BlockHeader {
    /// The block's identifying hash.
    pub fn digest(&self) -> String {
        sha256_hex(self)
    }
}

/// Content hash of a block's transaction list.
pub fn digest_transactions(transactions: &[Transaction]) -> String {
    sha256_hex(transactions)
}

/// A block of transactions. `hash` only caches `header.digest()`; an empty
/// string means it has not been computed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub hash: String,
}

impl Block {
    /// Build an unmined block on top of `previous` (or a height-0 block when
    /// there is none). Call `mine()` or hand it to a `Miner` to perform PoW.
    pub fn template(
        previous: Option<&Block>,
        transactions: Vec<Transaction>,
        config: &SimConfig,
    ) -> Self {
        let (height, previous_header_hash) = match previous {
            Some(prev) => (prev.header.height + 1, prev.header.digest()),
            None => (0, config.genesis_prev_sentinel.clone()),
        };
        let header = BlockHeader {
            transactions_digest: digest_transactions(&transactions),
            timestamp: Utc::now().timestamp_millis(),
            previous_header_hash,
            ceiling: config.ceiling.clone(),
            nonce: 0,
            height,
        };
        let mut block = Self {
            header,
            transactions,
            hash: String::new(),
        };
        block.seal();
        block
    }

    /// Create a node's genesis block: a single coinbase paying `miner_id`.
    /// Not mined; its hash is the real header digest, so every node's genesis
    /// is distinct.
    pub fn genesis(miner_id: &str, config: &SimConfig) -> Self {
        let coinbase = create_coinbase(miner_id, 0, config);
        Self::template(None, vec![coinbase], config)
    }

    pub fn compute_hash(&self) -> String {
        self.header.digest()
    }

    /// Refresh the cached hash from the header.
    pub fn seal(&mut self) {
        self.hash = self.compute_hash();
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn is_genesis(&self) -> bool {
        self.header.height == 0
    }

    /// A non-empty cached hash must agree with the header digest.
    pub fn verify_cached_hash(&self) -> Result<(), ValidationError> {
        if self.hash.is_empty() {
            return Ok(());
        }
        let computed = self.compute_hash();
        if self.hash != computed {
            return Err(ValidationError::HashMismatch {
                cached: self.hash.clone(),
                computed,
            });
        }
        Ok(())
    }

    /// Whether the header digest is below the header's ceiling.
    pub fn meets_ceiling(&self) -> bool {
        is_hash_below_ceiling(&self.compute_hash(), &self.header.ceiling)
    }

    /// Try up to `attempts` nonces starting at the current one. On success the
    /// winning nonce stays in the header and `hash` is set.
    pub fn mine_batch(&mut self, attempts: u32) -> bool {
        for _ in 0..attempts {
            let hash = self.compute_hash();
            if is_hash_below_ceiling(&hash, &self.header.ceiling) {
                self.hash = hash;
                return true;
            }
            self.header.nonce = self.header.nonce.wrapping_add(1);
        }
        false
    }

    /// Blocking Proof-of-Work search. Background mining goes through `Miner`.
    pub fn mine(&mut self) {
        while !self.mine_batch(u32::MAX) {}
    }
}

use serde::{Deserialize, Serialize};

/// Integer base units (see `config::COIN`).
pub type Amount = u64;

/// Build the external identifier of an output: `"{txid}-{index}"`.
pub fn output_id(txid: &str, index: u32) -> String {
    format!("{txid}-{index}")
}

/// Proof of ownership attached to an input by the optional signature layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputWitness {
    /// Hex compressed secp256k1 public key.
    pub public_key: String,
    /// Hex DER ECDSA signature.
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// `"{txid}-{index}"` of the spent output, or the reward sentinel.
    pub source_output_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness: Option<InputWitness>,
}

impl TxInput {
    pub fn new(source_output_id: impl Into<String>) -> Self {
        Self {
            source_output_id: source_output_id.into(),
            witness: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub index: u32,
    pub owner_id: String,
    pub value: Amount,
    /// Recipient address the signature layer checks spends against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<String>,
}

impl TxOutput {
    pub fn new(index: u32, owner_id: impl Into<String>, value: Amount) -> Self {
        Self {
            index,
            owner_id: owner_id.into(),
            value,
            lock: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Content id, see `engine::compute_txid`. Required before the
    /// transaction can touch a ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Creation time, unix milliseconds.
    pub timestamp: i64,
}

impl Transaction {
    /// Exactly one input, and it is the reward sentinel.
    pub fn is_coinbase(&self, reward_sentinel: &str) -> bool {
        self.inputs.len() == 1 && self.inputs[0].source_output_id == reward_sentinel
    }

    pub fn total_output_value(&self) -> u128 {
        self.outputs.iter().map(|o| o.value as u128).sum()
    }
}

use chrono::Utc;
use log::debug;
use std::collections::HashSet;
use std::fmt::Debug;

use super::model::{Transaction, TxInput, TxOutput, output_id};
use super::utxo::UtxoSet;
use crate::config::{BPS_DENOMINATOR, SimConfig};
use crate::error::ValidationError;
use crate::hashing::sha256_hex;

/// Extra, optional check run after baseline validation of every non-coinbase
/// transaction (e.g. signature ownership, see `wallet::SignatureVerifier`).
pub trait TransactionVerifier: Send + Sync + Debug {
    fn verify(&self, tx: &Transaction, utxo: &UtxoSet) -> Result<(), ValidationError>;
}

/// Deterministic transaction id.
///
/// The block height is part of the preimage so that two coinbases paying the
/// same miner at different heights never share an id. Witnesses are not part
/// of it, so signing does not change the id being signed.
pub fn compute_txid(inputs: &[TxInput], outputs: &[TxOutput], block_height: u64) -> String {
    let input_ids: Vec<&str> = inputs.iter().map(|i| i.source_output_id.as_str()).collect();
    sha256_hex(&serde_json::json!({
        "inputs": input_ids,
        "outputs": outputs,
        "block_height": block_height,
    }))
}

pub fn create_coinbase(miner_id: &str, block_height: u64, config: &SimConfig) -> Transaction {
    let inputs = vec![TxInput::new(config.reward_sentinel.clone())];
    let outputs = vec![TxOutput::new(0, miner_id, config.block_reward)];
    Transaction {
        txid: Some(compute_txid(&inputs, &outputs, block_height)),
        inputs,
        outputs,
        timestamp: Utc::now().timestamp_millis(),
    }
}

/// Split the coinbase output between `peer_ids` and the miner.
///
/// Each peer receives `floor(reward * bps / 10000 / n)`; the miner's change
/// output takes the rest, so the outputs always sum to the reward exactly.
/// Zero-value outputs are left out and the remaining ones renumbered.
/// Returns `None` when there is nobody to pay or every peer share rounds
/// down to zero.
pub fn create_redistribution(
    coinbase_txid: &str,
    miner_id: &str,
    peer_ids: &[String],
    block_height: u64,
    config: &SimConfig,
) -> Option<Transaction> {
    if peer_ids.is_empty() {
        return None;
    }
    let reward = config.block_reward;
    let pool = (reward as u128 * config.redistribution_bps as u128 / BPS_DENOMINATOR as u128) as u64;
    let share = pool / peer_ids.len() as u64;
    if share == 0 {
        debug!(
            "peer share of block #{} rounds to zero, skipping redistribution",
            block_height
        );
        return None;
    }
    let change = reward - share * peer_ids.len() as u64;

    let inputs = vec![TxInput::new(output_id(coinbase_txid, 0))];
    let mut outputs: Vec<TxOutput> = peer_ids
        .iter()
        .enumerate()
        .map(|(i, peer)| TxOutput::new(i as u32, peer.as_str(), share))
        .collect();
    if change > 0 {
        outputs.push(TxOutput::new(peer_ids.len() as u32, miner_id, change));
    }

    Some(Transaction {
        txid: Some(compute_txid(&inputs, &outputs, block_height)),
        inputs,
        outputs,
        timestamp: Utc::now().timestamp_millis(),
    })
}

/// Baseline transaction rules, checked in order; the first failure wins.
pub fn validate_transaction(
    tx: &Transaction,
    utxo: &UtxoSet,
    block_height: u64,
    is_coinbase: bool,
    config: &SimConfig,
) -> Result<(), ValidationError> {
    if is_coinbase {
        if !tx.is_coinbase(&config.reward_sentinel) {
            return Err(ValidationError::InvalidCoinbase(
                "must have exactly one reward input",
            ));
        }
        if tx.outputs.len() != 1 {
            return Err(ValidationError::InvalidCoinbase(
                "must have exactly one output",
            ));
        }
        if tx.outputs[0].value != config.block_reward {
            return Err(ValidationError::InvalidCoinbase(
                "output must equal the block reward",
            ));
        }
        return Ok(());
    }

    if tx.inputs.is_empty() {
        return Err(ValidationError::NoInputs);
    }

    // Every input must be spendable, and only once within this transaction.
    let mut seen = HashSet::with_capacity(tx.inputs.len());
    let mut input_sum: u128 = 0;
    for input in &tx.inputs {
        let id = input.source_output_id.as_str();
        let prev = utxo
            .get(id)
            .filter(|_| seen.insert(id))
            .ok_or_else(|| ValidationError::UnknownInput(id.to_string()))?;
        input_sum += prev.value as u128;
    }

    let output_sum = tx.total_output_value();
    if input_sum < output_sum {
        return Err(ValidationError::Inflation {
            inputs: input_sum,
            outputs: output_sum,
        });
    }

    if let Some(pos) = tx.outputs.iter().position(|o| o.value == 0) {
        return Err(ValidationError::NonPositiveOutput(pos));
    }

    for (expected, out) in tx.outputs.iter().enumerate() {
        if out.index != expected as u32 {
            return Err(ValidationError::OutputIndexSequence {
                expected: expected as u32,
                found: out.index,
            });
        }
    }

    if let Some(stored) = &tx.txid {
        let computed = compute_txid(&tx.inputs, &tx.outputs, block_height);
        if *stored != computed {
            debug!("txid mismatch at height {}: {} != {}", block_height, stored, computed);
            return Err(ValidationError::TxidMismatch {
                stored: stored.clone(),
                computed,
            });
        }
    }

    Ok(())
}

pub fn is_valid_transaction(
    tx: &Transaction,
    utxo: &UtxoSet,
    block_height: u64,
    is_coinbase: bool,
    config: &SimConfig,
) -> bool {
    validate_transaction(tx, utxo, block_height, is_coinbase, config).is_ok()
}

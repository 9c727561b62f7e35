use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::model::{Transaction, TxOutput, output_id};
use crate::error::ValidationError;

/// Unspent outputs keyed by `"{txid}-{index}"`.
///
/// Treated as a value: `apply` and `rebuild` hand back a new set and leave the
/// receiver alone, so a snapshot taken for validation can never alias the
/// ledger a node is mutating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtxoSet {
    map: BTreeMap<String, TxOutput>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// Insert a single output into the set.
    pub fn insert(&mut self, id: String, output: TxOutput) {
        self.map.insert(id, output);
    }

    pub fn get(&self, id: &str) -> Option<&TxOutput> {
        self.map.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Read-only iterator over all entries, ordered by output id.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TxOutput)> {
        self.map.iter()
    }

    /// Spend the inputs of `tx` and index its outputs, returning the new set.
    pub fn apply(&self, tx: &Transaction, reward_sentinel: &str) -> Result<Self, ValidationError> {
        let mut next = self.clone();
        next.apply_in_place(tx, reward_sentinel)?;
        Ok(next)
    }

    /// Replay `transactions` in order starting from an empty set.
    pub fn rebuild<'a, I>(transactions: I, reward_sentinel: &str) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut utxo = Self::new();
        for tx in transactions {
            utxo.apply_in_place(tx, reward_sentinel)?;
        }
        Ok(utxo)
    }

    /// All-or-nothing: the set is only touched once every check has passed.
    pub(crate) fn apply_in_place(
        &mut self,
        tx: &Transaction,
        reward_sentinel: &str,
    ) -> Result<(), ValidationError> {
        let txid = tx.txid.as_deref().ok_or(ValidationError::MissingTxid)?;

        let spent = tx
            .inputs
            .iter()
            .map(|i| i.source_output_id.as_str())
            .filter(|id| *id != reward_sentinel);
        for id in spent.clone() {
            if !self.map.contains_key(id) {
                return Err(ValidationError::UnknownInput(id.to_string()));
            }
        }

        for id in spent {
            self.map.remove(id);
        }
        for out in &tx.outputs {
            self.map.insert(output_id(txid, out.index), out.clone());
        }
        Ok(())
    }

    /// Outputs currently spendable by `owner`.
    pub fn outputs_of<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = (&'a String, &'a TxOutput)> {
        self.map.iter().filter(move |(_, out)| out.owner_id == owner)
    }

    pub fn balance_of(&self, owner: &str) -> u128 {
        self.outputs_of(owner).map(|(_, out)| out.value as u128).sum()
    }
}

pub mod engine;
pub mod model;
pub mod utxo;

pub use engine::{
    TransactionVerifier, compute_txid, create_coinbase, create_redistribution,
    is_valid_transaction, validate_transaction,
};
pub use model::{Amount, InputWitness, Transaction, TxInput, TxOutput, output_id};
pub use utxo::UtxoSet;

use thiserror::Error;

/// Why a transaction, block or chain was rejected.
///
/// Every variant is a normal "no" outcome: the candidate is dropped and the
/// caller's state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    // ---- transactions ----
    #[error("invalid coinbase: {0}")]
    InvalidCoinbase(&'static str),

    #[error("transaction has no inputs")]
    NoInputs,

    #[error("input references unknown or spent output {0}")]
    UnknownInput(String),

    #[error("outputs ({outputs}) exceed inputs ({inputs})")]
    Inflation { inputs: u128, outputs: u128 },

    #[error("output {0} has non-positive value")]
    NonPositiveOutput(usize),

    #[error("output index out of sequence: expected {expected}, found {found}")]
    OutputIndexSequence { expected: u32, found: u32 },

    #[error("txid mismatch: stored {stored}, computed {computed}")]
    TxidMismatch { stored: String, computed: String },

    #[error("transaction has no txid")]
    MissingTxid,

    #[error("transaction {index} rejected: {source}")]
    Transaction {
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },

    #[error("ownership check failed: {0}")]
    Unauthorized(String),

    // ---- blocks ----
    #[error("block has no transactions")]
    EmptyBlock,

    #[error("transactions digest does not match header")]
    TransactionsDigestMismatch,

    #[error("previous header hash mismatch: expected {expected}, found {found}")]
    PreviousHashMismatch { expected: String, found: String },

    #[error("height mismatch: expected {expected}, found {found}")]
    HeightMismatch { expected: u64, found: u64 },

    #[error("timestamp {timestamp} outside accepted window around {now}")]
    TimestampOutOfRange { timestamp: i64, now: i64 },

    #[error("header ceiling {0} differs from configured ceiling")]
    CeilingMismatch(String),

    #[error("header hash {0} is not below ceiling")]
    InsufficientWork(String),

    #[error("cached hash {cached} does not match header digest {computed}")]
    HashMismatch { cached: String, computed: String },

    #[error("genesis blocks cannot be appended")]
    GenesisAppend,

    // ---- chains ----
    #[error("chain is empty")]
    EmptyChain,

    #[error("invalid genesis block: {0}")]
    InvalidGenesis(&'static str),

    #[error("block {height} has a timestamp earlier than its predecessor")]
    NonMonotonicTimestamp { height: u64 },

    #[error("block {height} rejected: {source}")]
    Block {
        height: u64,
        #[source]
        source: Box<ValidationError>,
    },

    #[error("candidate chain ({candidate} blocks) is not longer than ours ({current})")]
    NotLonger { candidate: usize, current: usize },
}

/// Invalid simulator parameter bundle.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("block reward must be > 0")]
    ZeroReward,

    #[error("redistribution ratio {0} bps is above 10000")]
    RatioOutOfRange(u32),

    #[error("ceiling {0:?} is not a hex magnitude")]
    InvalidCeiling(String),

    #[error("mining batch size must be > 0")]
    ZeroBatchSize,

    #[error("min network delay {min}ms exceeds max {max}ms")]
    DelayBounds { min: u64, max: u64 },

    #[error("height probe interval must be > 0")]
    ZeroProbeInterval,

    #[error("sentinels must not be empty")]
    EmptySentinel,
}

/// Key handling and signing failures in the wallet helpers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("invalid {0} hex")]
    InvalidHex(&'static str),

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid DER signature")]
    InvalidSignature,

    #[error("transaction has no input {0}")]
    InputOutOfRange(usize),

    #[error("transaction must carry a txid before it is signed")]
    MissingTxid,
}

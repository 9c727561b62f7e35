pub mod block;
pub mod chain;
pub mod model;
pub mod validation;

pub use block::{Block, BlockHeader, digest_transactions};
pub use model::Blockchain;
pub use validation::ConsensusRules;

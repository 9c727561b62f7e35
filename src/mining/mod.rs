pub mod miner;

pub use miner::{Miner, OnBlockMined};

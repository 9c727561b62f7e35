pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod hashing;
pub mod mining;
pub mod network;
pub mod node;
pub mod node_id;
pub mod transaction;
pub mod wallet;

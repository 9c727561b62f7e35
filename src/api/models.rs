use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::SimConfig;
use crate::network::Network;
use crate::node::Node;

/// Shared application state: the simulated network and its parameters.
pub struct AppState {
    pub network: Arc<Network>,
    pub config: Arc<SimConfig>,
}

impl AppState {
    pub fn new(network: Arc<Network>) -> Self {
        let config = network.config().clone();
        Self { network, config }
    }
}

/* ---------- Node API Models ---------- */

#[derive(Serialize)]
pub struct NodeSummary {
    pub node_id: String,
    pub length: usize,
    pub tip_hash: String,
    pub is_mining: bool,
    pub peer_ids: Vec<String>,
    pub utxo_size: usize,
}

impl NodeSummary {
    pub fn of(node: &Node) -> Self {
        let (length, utxo_size) = node.with_blockchain(|bc| (bc.len(), bc.utxo().len()));
        Self {
            node_id: node.id().to_string(),
            length,
            tip_hash: node.tip_hash(),
            is_mining: node.is_mining(),
            peer_ids: node.peer_ids(),
            utxo_size,
        }
    }
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub node_id: String,
    pub valid: bool,
    pub length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub node_id: String,
    pub owner: String,
    pub balance: u128,
    pub utxos: usize,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub nodes: usize,
    pub mining_nodes: usize,
    pub min_length: usize,
    pub max_length: usize,
    /// Every node has the same tip.
    pub converged: bool,
    pub last_interval_ms: Option<i64>,
    pub avg_interval_ms: Option<f64>,
    pub ceiling: String,
    pub block_reward: u64,
    pub redistribution_bps: u32,
}

/* ---------- Mining API Models ---------- */

/// Omit `node_id` to target every node.
#[derive(Deserialize, Default)]
pub struct MiningRequest {
    pub node_id: Option<String>,
}

#[derive(Serialize)]
pub struct MiningResponse {
    pub mining: bool,
    pub node_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct NewWalletResponse {
    pub private_key: String,
    pub public_key: String,
    pub address: String,
}

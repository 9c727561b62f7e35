use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, StatsResponse};
use crate::blockchain::Block;

#[get("/stats/")]
pub async fn get_stats(state: web::Data<AppState>) -> impl Responder {
    let nodes = state.network.nodes();

    let mut lengths = Vec::with_capacity(nodes.len());
    let mut tips = Vec::with_capacity(nodes.len());
    let mut longest: Vec<Block> = Vec::new();
    for node in &nodes {
        node.with_blockchain(|bc| {
            lengths.push(bc.len());
            tips.push(bc.tip().hash.clone());
            if bc.len() > longest.len() {
                longest = bc.blocks().to_vec();
            }
        });
    }

    // block intervals along the longest chain, genesis excluded
    let intervals: Vec<i64> = longest
        .windows(2)
        .skip(1)
        .map(|pair| (pair[1].header.timestamp - pair[0].header.timestamp).max(0))
        .collect();
    let avg_interval_ms = if intervals.is_empty() {
        None
    } else {
        Some(intervals.iter().sum::<i64>() as f64 / intervals.len() as f64)
    };

    HttpResponse::Ok().json(StatsResponse {
        nodes: nodes.len(),
        mining_nodes: nodes.iter().filter(|n| n.is_mining()).count(),
        min_length: lengths.iter().copied().min().unwrap_or(0),
        max_length: lengths.iter().copied().max().unwrap_or(0),
        converged: tips.windows(2).all(|pair| pair[0] == pair[1]),
        last_interval_ms: intervals.last().copied(),
        avg_interval_ms,
        ceiling: state.config.ceiling.clone(),
        block_reward: state.config.block_reward,
        redistribution_bps: state.config.redistribution_bps,
    })
}

use actix_web::{HttpResponse, Responder, post, web};
use log::info;
use std::sync::Arc;

use super::models::{AppState, MiningRequest, MiningResponse};
use crate::node::Node;

/// Nodes addressed by the request, or `Err(id)` for an unknown node.
fn targets(state: &AppState, req: Option<web::Json<MiningRequest>>) -> Result<Vec<Arc<Node>>, String> {
    match req.and_then(|r| r.into_inner().node_id) {
        Some(id) => state.network.node(&id).map(|n| vec![n]).ok_or(id),
        None => Ok(state.network.nodes()),
    }
}

#[post("/mining/start/")]
pub async fn start_mining(
    state: web::Data<AppState>,
    req: Option<web::Json<MiningRequest>>,
) -> impl Responder {
    let nodes = match targets(&state, req) {
        Ok(nodes) => nodes,
        Err(id) => return HttpResponse::NotFound().body(format!("unknown node {id}")),
    };
    for node in &nodes {
        node.start_mining();
    }
    let node_ids: Vec<String> = nodes.iter().map(|n| n.id().to_string()).collect();
    info!("API - mining started on {:?}", node_ids);
    HttpResponse::Ok().json(MiningResponse {
        mining: true,
        node_ids,
    })
}

#[post("/mining/stop/")]
pub async fn stop_mining(
    state: web::Data<AppState>,
    req: Option<web::Json<MiningRequest>>,
) -> impl Responder {
    let nodes = match targets(&state, req) {
        Ok(nodes) => nodes,
        Err(id) => return HttpResponse::NotFound().body(format!("unknown node {id}")),
    };
    for node in &nodes {
        node.stop_mining();
    }
    let node_ids: Vec<String> = nodes.iter().map(|n| n.id().to_string()).collect();
    info!("API - mining stopped on {:?}", node_ids);
    HttpResponse::Ok().json(MiningResponse {
        mining: false,
        node_ids,
    })
}

use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, NodeSummary, ValidateResponse};

/// One summary line per node.
#[get("/nodes/")]
pub async fn list_nodes(state: web::Data<AppState>) -> impl Responder {
    let nodes: Vec<NodeSummary> = state
        .network
        .nodes()
        .iter()
        .map(|node| NodeSummary::of(node))
        .collect();
    HttpResponse::Ok().json(nodes)
}

/// Full snapshot of one node: blocks, UTXO set, mining flag and peers.
#[get("/nodes/{id}/")]
pub async fn get_node(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let id = path.into_inner().0;
    match state.network.node(&id) {
        Some(node) => HttpResponse::Ok().json(node.snapshot()),
        None => HttpResponse::NotFound().body(format!("unknown node {id}")),
    }
}

/// Re-validate a node's whole chain.
#[get("/nodes/{id}/validate/")]
pub async fn validate_node(
    state: web::Data<AppState>,
    path: web::Path<(String,)>,
) -> impl Responder {
    let id = path.into_inner().0;
    let Some(node) = state.network.node(&id) else {
        return HttpResponse::NotFound().body(format!("unknown node {id}"));
    };
    let (length, result) = node.with_blockchain(|bc| (bc.len(), bc.validate()));
    HttpResponse::Ok().json(ValidateResponse {
        node_id: id,
        valid: result.is_ok(),
        length,
        error: result.err().map(|e| e.to_string()),
    })
}

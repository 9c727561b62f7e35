use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, BalanceResponse};

/// Balance of `owner` as seen by node `id`'s ledger.
#[get("/nodes/{id}/balance/{owner}/")]
pub async fn get_balance(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (id, owner) = path.into_inner();
    let Some(node) = state.network.node(&id) else {
        return HttpResponse::NotFound().body(format!("unknown node {id}"));
    };

    let (balance, utxos) = node.with_blockchain(|bc| {
        let utxo = bc.utxo();
        (utxo.balance_of(&owner), utxo.outputs_of(&owner).count())
    });

    HttpResponse::Ok().json(BalanceResponse {
        node_id: id,
        owner,
        balance,
        utxos,
    })
}

use actix_web::{HttpResponse, Responder, post};

use super::models::NewWalletResponse;
use crate::wallet::generate_keypair_hex;

#[post("/wallet/new/")]
pub async fn create_wallet() -> impl Responder {
    let (sk, pk, addr) = generate_keypair_hex();
    HttpResponse::Ok().json(NewWalletResponse {
        private_key: sk,
        public_key: pk,
        address: addr,
    })
}

mod balance;
mod health;
mod mining;
pub mod models;
mod nodes;
mod stats;
mod wallet;

use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(nodes::list_nodes)
            .service(nodes::get_node)
            .service(nodes::validate_node)
            .service(balance::get_balance)
            .service(stats::get_stats)
            .service(mining::start_mining)
            .service(mining::stop_mining)
            .service(wallet::create_wallet),
    );
}

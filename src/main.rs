use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::info;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use nakamoto_sim::api::{self, AppState};
use nakamoto_sim::blockchain::ConsensusRules;
use nakamoto_sim::config::SimConfig;
use nakamoto_sim::network::Network;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = SimConfig::from_env()
        .map(Arc::new)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let (host, port) = (config.host.clone(), config.port);

    let network = Network::fully_connected(config.node_count, ConsensusRules::new(config.clone()));
    network.start_all_mining();
    let _probe = network
        .start_periodic_height_probing(Duration::from_millis(config.height_probe_interval_ms));
    info!(
        "{} nodes mining, probing heights every {}ms",
        config.node_count, config.height_probe_interval_ms
    );

    println!("⛓️ Starting simulator API at http://{host}:{port}");

    let state = web::Data::new(AppState::new(network));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

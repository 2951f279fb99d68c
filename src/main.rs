mod config;
mod models;
mod services;

use config::server_config::server_addr;
use services::room_service::RoomService;
use services::websocket_service::run_websocket_server;

use std::sync::Arc;

#[tokio::main]
async fn main() {
    env_logger::init();

    let rooms = Arc::new(RoomService::new());
    run_websocket_server(&server_addr(), rooms).await;
}

use log::info;

use scrawl_collab::server::{ServerConfig, SyncServer};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut config = ServerConfig::default();
    if let Some(bind_addr) = std::env::args().nth(1) {
        config.bind_addr = bind_addr;
    }

    info!("starting scrawl server on {}", config.bind_addr);
    SyncServer::new(config).run().await
}

use anyhow::Result;
use clap::Parser;
use log::info;
use log4rs::config::Deserializers;
use moray::{
    config::{self, MorayConfig},
    server::MorayServer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    log4rs::init_file(config::LOG4RS_CONFIG_FILE_PATH, Deserializers::default()).unwrap();
    // Parse config
    let config = MorayConfig::parse();
    // Create server
    let server = MorayServer::new(config.bind_address());
    // Bind and serve clients until interrupted
    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    }
}

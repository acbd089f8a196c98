//! Slipstream server binary.

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use slipstream::{RaceServer, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("SLIPSTREAM_ADDR") {
        config.bind_addr = addr;
    }
    if let Ok(dir) = std::env::var("SLIPSTREAM_DATA") {
        config.data_dir = PathBuf::from(dir);
    }

    info!(
        version = slipstream::VERSION,
        addr = %config.bind_addr,
        data_dir = %config.data_dir.display(),
        "starting slipstream server"
    );

    let server = RaceServer::new(config);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}

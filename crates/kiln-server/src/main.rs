use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use kiln_server::{config, Server};
use tracing::error;

/// A single-node RESP key-value server with append-only logging,
/// checksummed snapshots, and memory-bounded eviction.
#[derive(Parser)]
#[command(name = "kiln-server", version)]
struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = "kiln.conf")]
    config: PathBuf,

    /// Listen address.
    #[arg(long, default_value = "0.0.0.0:6379")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiln=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = config::read_config(&args.config);

    let server = match Server::bind(config, args.listen).await {
        Ok(server) => server,
        Err(e) => {
            error!(addr = %args.listen, error = %e, "cannot bind listener");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!(error = %e, "server terminated");
        std::process::exit(1);
    }
}

//! Serengeti Server Binary
//!
//! Starts the TCP query server, the discovery beacon, the storage
//! scheduler, and the reshuffle watcher.

use clap::Parser;

use serengeti_core::network::Server;
use serengeti_core::{Config, Runtime};

/// Serengeti distributed key-document database node.
#[derive(Parser, Debug)]
#[command(name = "serengeti-server")]
#[command(about = "Self-organizing distributed key-document database node")]
struct Args {
    /// Data directory.
    #[arg(short, long, default_value = "./serengeti_data")]
    data_dir: String,

    /// Client-facing TCP listen address.
    #[arg(short, long, default_value = "127.0.0.1:1985")]
    listen: String,

    /// Inter-node replication RPC listen address.
    #[arg(long, default_value = "127.0.0.1:1986")]
    replication: String,

    /// UDP discovery beacon address.
    #[arg(long, default_value = "0.0.0.0:19850")]
    discovery: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(args.data_dir)
        .listen_addr(args.listen)
        .replication_addr(args.replication)
        .discovery_addr(args.discovery)
        .build();

    let runtime = Runtime::open(config.clone()).expect("failed to open runtime");
    runtime.start();

    let mut server = Server::new(config, runtime.clone());
    if let Err(e) = server.run() {
        tracing::error!("server error: {e}");
        runtime.shutdown();
        std::process::exit(1);
    }
    runtime.shutdown();
}

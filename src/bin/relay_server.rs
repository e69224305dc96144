//! Standalone relay server binary
//!
//! Run with:
//!   cargo run --bin relay-server -- --port 8080

use clap::Parser;
use tracing::{info, Level};

use huddle::relay::RelayServer;

/// Relay server for huddle chat and voice signaling
#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "Relay server for huddle chat and voice signaling")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let addr = format!("{}:{}", args.host, args.port);
    info!("relay server starting on {}", addr);

    let server = RelayServer::new();
    server.run(&addr).await?;
    Ok(())
}

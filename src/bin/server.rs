//! Terminal chat server over plain TCP.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin server
//! cargo run --bin server -- --host 0.0.0.0 --port 9000
//! ```
//!
//! Set `GEMINI_API_KEY` to enable the `/ai` commands.

use clap::Parser;
use idobata::common::logger::setup_logger;
use idobata::server::{Server, ServerConfig, signal};

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Multi-room terminal chat server", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        ..ServerConfig::default()
    };

    let handle = match Server::new(config).start().await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Server error: {}", e);
            std::process::exit(1);
        }
    };

    signal::shutdown_signal().await;
    handle.shutdown().await;
}

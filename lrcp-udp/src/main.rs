//! Entry point for `lrcp-udp`.
//!
//! Parses CLI arguments and runs the line-reversal server.  All protocol work
//! is delegated to library modules; `main.rs` owns only process setup
//! (logging, signal handling, argument parsing).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use lrcp_udp::config::DEFAULT_BIND;
use lrcp_udp::timer::TimerConfig;
use lrcp_udp::{Server, ServerConfig, SessionConfig};

/// Line-reversal server speaking LRCP over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Local address to bind.
    #[arg(short, long, env = "LRCP_BIND", default_value = DEFAULT_BIND)]
    bind: SocketAddr,

    /// Retransmission period in milliseconds.
    #[arg(long, env = "LRCP_RETRANSMIT_MS", default_value_t = 2000)]
    retransmit_ms: u64,
}

impl Cli {
    fn config(&self) -> anyhow::Result<ServerConfig> {
        anyhow::ensure!(self.retransmit_ms > 0, "--retransmit-ms must be positive");
        Ok(ServerConfig {
            bind: self.bind,
            session: SessionConfig {
                timers: TimerConfig {
                    retransmit_interval: Duration::from_millis(self.retransmit_ms),
                },
            },
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.config()?;

    let server = Server::bind(config)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    log::info!("Starting server on {}", server.local_addr());

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("server stopped")?;

    log::info!("Server stopped");
    Ok(())
}

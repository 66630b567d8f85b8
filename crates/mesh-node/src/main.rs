//! # mesh-node
//!
//! Mesh node binary: listens for peers on the given address, dials peers on
//! request, and broadcasts every other stdin line to all connected peers.
//!
//! ```text
//! mesh-node 127.0.0.1:7000
//! > c 127.0.0.1:7001
//! > hello everyone
//! > q
//! ```

#![deny(unsafe_code)]

mod input;
mod repl;
mod signals;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mesh_events::EventBus;
use mesh_server::{DEFAULT_SHUTDOWN_GRACE, MeshServer, Node, NodeConfig, WsDialer};
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::info;

use crate::repl::Exit;
use crate::signals::wait_for_shutdown_signal;

/// Grace period for in-flight tasks once `main` returns. Stdin reads run on
/// a blocking thread that never finishes on its own.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Peer node in a WebSocket message mesh.
#[derive(Parser, Debug)]
#[command(name = "mesh-node", about = "Peer node in a WebSocket message mesh")]
struct Cli {
    /// Address to listen on for peers (for example `127.0.0.1:7000`).
    address: String,

    /// Settings file (default `~/.mesh/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(run(args));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

async fn run(args: Cli) -> Result<()> {
    let settings_path = args.settings.unwrap_or_else(mesh_settings::settings_path);
    let settings = mesh_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    mesh_core::logging::init_subscriber(&settings.logging.level, settings.logging.format);
    info!(
        address = %args.address,
        settings = %settings_path.display(),
        "starting mesh node"
    );

    let bus = Arc::new(EventBus::with_default_handlers());

    let listener = TcpListener::bind(&args.address)
        .await
        .with_context(|| format!("Failed to bind {}", args.address))?;

    let node = Node::new(
        args.address.clone(),
        bus,
        Arc::new(WsDialer::new(settings.transport.ws_path.clone())),
        NodeConfig {
            handshake_timeout: settings.transport.handshake_timeout(),
        },
    );
    let server = MeshServer::new(Arc::clone(&node), settings.transport.clone());
    let (addr, handle) = server.serve(listener).context("Failed to start listener")?;
    info!(%addr, ws_path = %settings.transport.ws_path, "mesh node ready");

    let stdin = BufReader::new(tokio::io::stdin());
    let outcome = tokio::select! {
        exit = repl::run(&node, stdin, tokio::io::stdout()) => match exit {
            Ok(Exit::InputClosed) => {
                info!("stdin closed, waiting for a termination signal");
                wait_for_shutdown_signal().await.context("Failed to listen for signals")
            }
            Ok(Exit::Quit) => Ok(()),
            Err(e) => Err(e).context("Failed to read input"),
        },
        signal = wait_for_shutdown_signal() => signal.context("Failed to listen for signals"),
    };

    info!("shutting down");
    server.shutdown(handle, DEFAULT_SHUTDOWN_GRACE).await;
    info!("shutdown complete");
    outcome
}

// Copyright (c) 2026 Tricoin Developers. MIT License.
// See LICENSE for details.

//! # Tricoin Node
//!
//! Entry point for the `tricoin-node` binary: parse the CLI, initialize
//! logging, open (or create) the chain database, and serve the HTTP API.
//!
//! On a fresh data directory the chain engine mines the genesis block
//! before the listener comes up — the node has nothing to serve until the
//! chain exists.

mod api;
mod cli;
mod explorer;
mod logging;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use tricoin_protocol::consensus::Blockchain;

use crate::explorer::Explorer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::NodeCli::parse();
    logging::init(
        &cli.log_level,
        logging::LogFormat::from_str_lossy(&cli.log_format),
    );

    tracing::info!(
        addr = %cli.addr,
        data_dir = %cli.data_dir.display(),
        "starting tricoin-node"
    );

    // Genesis mining happens in here on first start; failure is fatal.
    let data_dir = cli.data_dir.clone();
    let chain = tokio::task::spawn_blocking(move || Blockchain::open(&data_dir))
        .await
        .context("chain bootstrap task panicked")?
        .with_context(|| format!("failed to open chain at {}", cli.data_dir.display()))?;
    let chain = Arc::new(chain);

    let head = chain.head();
    tracing::info!(
        height = head.block_height,
        totaldiff = head.total_difficulty,
        head = %head.id(),
        "chain ready"
    );

    let state = api::AppState {
        chain,
        explorer: Arc::new(Explorer::new()),
    };
    let router = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&cli.addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", cli.addr))?;
    tracing::info!("listening on {}", cli.addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    tracing::info!("tricoin-node stopped");
    Ok(())
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

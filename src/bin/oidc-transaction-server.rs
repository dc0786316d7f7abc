// ABOUTME: Server binary for the OIDC transaction server
// ABOUTME: Loads configuration, bootstraps resources and serves the HTTP routes until signalled
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![recursion_limit = "256"]

//! # OIDC Transaction Server Binary
//!
//! Starts the authorization server with the transaction store selected by
//! `REDIS_URL` and the collaborators described by `IDP_SEED_FILE`.

use anyhow::Result;
use clap::Parser;
use oidc_transaction_server::{
    config::environment::ServerConfig, logging, resources::ServerResources, routes,
};
use std::future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "oidc-transaction-server")]
#[command(about = "OpenID Connect authorization server with linked cross-device authorization")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override the seed file with clients and identities
    #[arg(long)]
    seed_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    if let Some(seed_file) = args.seed_file {
        config.seed_file = Some(seed_file);
    }

    logging::init_from_env()?;
    info!("Starting OIDC transaction server");
    info!("{}", config.summary());

    let port = config.http_port;
    let resources = Arc::new(ServerResources::bootstrap(config).await?);
    let app = routes::router(resources);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {addr}");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
        return Err(e.into());
    }

    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}

//! Serve command implementation
//!
//! Runs the HTTP API until a shutdown signal arrives.

use crate::config::load_config;
use crate::core::engine::SyncEngine;
use crate::server;
use clap::Args;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override server.bind_address
    #[arg(short, long)]
    pub bind: Option<String>,
}

impl ServeArgs {
    /// Execute the serve command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Configuration load failed");
                eprintln!("Configuration error: {e}");
                return Ok(2);
            }
        };

        let engine = match SyncEngine::from_config(&config).await {
            Ok(engine) => Arc::new(engine.with_shutdown(shutdown_signal.clone())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create sync engine");
                eprintln!("Failed to initialize: {e}");
                return Ok(4);
            }
        };

        let address = self
            .bind
            .clone()
            .unwrap_or_else(|| config.server.bind_address.clone());
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(address = %address, error = %e, "Failed to bind");
                eprintln!("Failed to bind {address}: {e}");
                return Ok(4);
            }
        };

        println!("🚀 MedBridge listening on {address}");
        if let Err(e) = server::serve(listener, engine, shutdown_signal).await {
            crate::log_error_with_context!(&e, "HTTP server failed");
            return Ok(5);
        }
        Ok(0)
    }
}

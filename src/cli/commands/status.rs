//! Status command implementation
//!
//! This module implements the `status` command for displaying outstanding
//! sync work.

use crate::config::load_config;
use crate::core::engine::SyncEngine;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking sync status");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let engine = match SyncEngine::from_config(&config).await {
            Ok(engine) => engine,
            Err(e) => {
                println!("❌ Failed to connect to database");
                println!("   Error: {e}");
                return Ok(4);
            }
        };

        let status = match engine.status().await {
            Ok(status) => status,
            Err(e) => {
                println!("❌ Failed to read sync status");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(0);
        }

        println!("📊 Sync Status ({})", status.backend);
        println!();
        println!("  Hospitals: {}", status.hospitals);
        println!("  Finished encounters awaiting registry: {}", status.pending_encounters);
        println!("  Active duplicate markers: {}", status.active_duplicate_markers);
        println!();

        if status.pending_items.is_empty() {
            println!("No unsynced items.");
        } else {
            println!("{:<15} {:<10}", "Category", "Unsynced");
            println!("{}", "-".repeat(26));
            for (category, count) in &status.pending_items {
                println!("{category:<15} {count:<10}");
            }
        }

        println!();
        Ok(0)
    }
}

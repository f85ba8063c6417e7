//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the MedBridge configuration file.

use crate::config::load_config;
use crate::config::schema::DatabaseTarget;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    ///
    /// Loading already validates, so a load failure is a validation failure.
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  Registry: {}", config.registry.base_url);
        println!("  Identifier System: {}", config.registry.identifier_system);

        match config.database_target {
            DatabaseTarget::Memory => println!("  Database Target: memory"),
            DatabaseTarget::PostgreSQL => {
                if let Some(ref pg_config) = config.postgresql {
                    use secrecy::ExposeSecret;
                    println!("  Database Target: PostgreSQL");
                    println!(
                        "  PostgreSQL Connection: {}",
                        connection_host(pg_config.connection_string.expose_secret().as_str())
                    );
                    println!("  Max Connections: {}", pg_config.max_connections);
                }
            }
        }

        println!("  Notifications: {}", config.notifications.sink);
        println!("  Submit On Event: {}", config.sync.submit_on_event);
        println!("  Item Timeout: {}s", config.sync.item_timeout_seconds);
        println!("  Bind Address: {}", config.server.bind_address);
        println!("  Hospitals:");
        for hospital in &config.hospitals {
            println!(
                "    - {} (organization {}){}",
                hospital.id,
                hospital.organization_id,
                if hospital.enabled { "" } else { " [disabled]" }
            );
        }
        println!();
        Ok(0)
    }
}

/// Part of a connection string after the credentials
fn connection_host(connection_string: &str) -> &str {
    connection_string.split('@').next_back().unwrap_or("***")
}

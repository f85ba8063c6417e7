//! Configuration management for MedBridge.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! MedBridge uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - Default values for optional settings
//! - `MEDBRIDGE_*` environment overrides
//! - Type-safe configuration structs
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use medbridge::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("medbridge.toml")?;
//!
//! println!("Registry: {}", config.registry.base_url);
//! for hospital in &config.hospitals {
//!     println!("Hospital {} (enabled: {})", hospital.id, hospital.enabled);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level and dry-run switch
//! - [`RegistryConfig`] - FHIR registry endpoints, timeouts and retry policy
//! - [`HospitalConfig`] - Per-hospital registry credentials
//! - [`PostgreSQLConfig`] - PostgreSQL datastore
//! - [`NotificationConfig`] - Outbound notification sink
//! - [`SyncConfig`] - Per-item timeout and default diagnosis
//! - [`ServerConfig`] - HTTP listener
//! - [`LoggingConfig`] - Logging configuration
//!
//! # Example Configuration
//!
//! ```toml
//! database_target = "postgresql"
//!
//! [registry]
//! base_url = "https://api-satusehat.kemkes.go.id/fhir-r4/v1"
//! auth_url = "https://api-satusehat.kemkes.go.id/oauth2/v1/accesstoken"
//!
//! [[hospitals]]
//! id = "RS-01"
//! organization_id = "10000004"
//! client_id = "${RS01_CLIENT_ID}"
//! client_secret = "${RS01_CLIENT_SECRET}"
//!
//! [postgresql]
//! connection_string = "${MEDBRIDGE_PG_URL}"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, BridgeConfig, DatabaseTarget, HospitalConfig, LoggingConfig,
    NotificationConfig, PostgreSQLConfig, RegistryConfig, RetryConfig, ServerConfig, SyncConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};

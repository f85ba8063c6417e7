// MedBridge - Clinical event synchronization engine
// Copyright (c) 2025 MedBridge Contributors
// Licensed under the MIT License

//! # MedBridge - clinical event synchronization
//!
//! MedBridge mirrors encounters and their clinical sub-records from a
//! hospital record store into a national FHIR registry.
//!
//! ## Overview
//!
//! - **Lifecycle** events (arrived, in progress, finished, cancelled) keep a
//!   per-encounter status history that is repaired only when a payload is
//!   built from it
//! - **Pipelines** match re-sent sub-records by natural key and submit
//!   anything without a registry id, creating once and overwriting after
//! - **Diagnostic chains** write ServiceRequest, Specimen (lab only),
//!   Observation and DiagnosticReport strictly in order and resume at the
//!   first stage without a registry id
//! - **Duplicate** refusals leave a marker that only the reconciliation
//!   sweep resolves
//! - **Sweeps** re-drive whatever is still unsynced, on demand
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`server`] - HTTP API
//! - [`core`] - Sync logic (lifecycle, pipelines, chains, duplicates, sweeps)
//! - [`adapters`] - Registry client, datastores and notification sinks
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medbridge::config::load_config;
//! use medbridge::core::engine::SyncEngine;
//! use medbridge::domain::SweepKind;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("medbridge.toml")?;
//!     let engine = SyncEngine::from_config(&config).await?;
//!
//!     let summary = engine.reconcile(SweepKind::All).await?;
//!     println!("Submitted {} encounters", summary.encounters_submitted);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Library code returns [`domain::Result`], whose error is
//! [`domain::BridgeError`]. A registry refusal is not an error: it comes back
//! as [`adapters::registry::RegistryResponse::Rejected`].

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
pub mod server;

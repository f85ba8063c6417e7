//! PostgreSQL datastore integration
//!
//! This module provides the PostgreSQL implementation of the datastore
//! traits. Records are stored as JSONB documents next to indexed columns.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::PostgreSQLAdapter;
pub use client::PostgreSQLClient;

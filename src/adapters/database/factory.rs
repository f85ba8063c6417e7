//! Datastore factory
//!
//! This module provides a factory function to create the datastore based on configuration.

use crate::adapters::database::memory::MemoryStore;
use crate::adapters::database::traits::SyncStore;
use crate::adapters::postgresql::adapter::PostgreSQLAdapter;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::config::schema::{BridgeConfig, DatabaseTarget};
use crate::domain::errors::BridgeError;
use crate::domain::Result;
use std::sync::Arc;

/// Create the datastore selected by `database_target`
///
/// # Errors
///
/// Returns an error if the PostgreSQL section is missing or the pool
/// cannot be created
pub async fn create_sync_store(config: &BridgeConfig) -> Result<Arc<dyn SyncStore>> {
    match config.database_target {
        DatabaseTarget::Memory => {
            tracing::info!("Creating in-memory datastore");
            Ok(Arc::new(MemoryStore::new()))
        }
        DatabaseTarget::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                BridgeError::Configuration(
                    "postgresql configuration is required when database_target = 'postgresql'"
                        .to_string(),
                )
            })?;

            tracing::info!("Creating PostgreSQL datastore");
            let client = PostgreSQLClient::new(pg_config.clone()).await?;
            client.ensure_schema().await?;
            Ok(Arc::new(PostgreSQLAdapter::new(client)))
        }
    }
}

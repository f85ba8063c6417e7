//! Remote FHIR registry adapter
//!
//! [`RegistryClient`] is the seam the sync core talks to. The HTTP
//! implementation handles tokens, retries and OperationOutcome
//! classification; [`DryRunRegistry`] stands in when nothing may be sent.

pub mod dry_run;
pub mod http;
pub mod outcome;
pub mod token;
pub mod traits;

pub use dry_run::{is_dry_run, DryRunRegistry};
pub use http::HttpRegistryClient;
pub use traits::{Accepted, RegistryClient, RegistryResponse, Rejection, RejectionKind};

use crate::config::BridgeConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Creates the registry client selected by the configuration
pub fn create_registry_client(config: &BridgeConfig) -> Result<Arc<dyn RegistryClient>> {
    if config.application.dry_run {
        tracing::info!("Dry run enabled, registry calls will not be sent");
        return Ok(Arc::new(DryRunRegistry));
    }
    Ok(Arc::new(HttpRegistryClient::new(
        &config.registry,
        &config.hospitals,
    )?))
}

//! Registry stand-in for dry runs
//!
//! Every write is logged and answered with a rejection, so no external id
//! is ever persisted and everything stays pending for a real run.

use super::traits::{RegistryClient, RegistryResponse, Rejection, RejectionKind};
use crate::domain::ids::HospitalId;
use crate::domain::Result;
use async_trait::async_trait;
use serde_json::Value;

const DRY_RUN_MESSAGE: &str = "dry run: request not sent";

/// No-op [`RegistryClient`]
#[derive(Debug, Default)]
pub struct DryRunRegistry;

impl DryRunRegistry {
    fn skipped(&self) -> RegistryResponse {
        RegistryResponse::Rejected(Rejection {
            status: 0,
            kind: RejectionKind::Other,
            message: DRY_RUN_MESSAGE.to_string(),
            body: Value::Null,
        })
    }
}

#[async_trait]
impl RegistryClient for DryRunRegistry {
    async fn create(
        &self,
        hospital: &HospitalId,
        resource_type: &str,
        payload: &Value,
    ) -> Result<RegistryResponse> {
        tracing::info!(
            hospital_id = %hospital,
            resource_type = resource_type,
            payload = %payload,
            "Dry run: would create resource"
        );
        Ok(self.skipped())
    }

    async fn update(
        &self,
        hospital: &HospitalId,
        resource_type: &str,
        id: &str,
        payload: &Value,
    ) -> Result<RegistryResponse> {
        tracing::info!(
            hospital_id = %hospital,
            resource_type = resource_type,
            external_id = id,
            payload = %payload,
            "Dry run: would update resource"
        );
        Ok(self.skipped())
    }

    async fn search(
        &self,
        hospital: &HospitalId,
        resource_type: &str,
        params: &[(String, String)],
    ) -> Result<Vec<Value>> {
        tracing::info!(
            hospital_id = %hospital,
            resource_type = resource_type,
            params = ?params,
            "Dry run: would search resources"
        );
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

/// True when a rejection was produced by [`DryRunRegistry`]
pub fn is_dry_run(rejection: &Rejection) -> bool {
    rejection.status == 0 && rejection.message == DRY_RUN_MESSAGE
}

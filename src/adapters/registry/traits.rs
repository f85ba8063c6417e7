//! Registry client trait and response types

use crate::domain::ids::HospitalId;
use crate::domain::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Structured reason for a registry rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The identifier is already registered for another resource
    Duplicate,
    /// A value in the payload was refused (bad code, missing field, ...)
    InvalidValue,
    /// Any other client-side refusal
    Other,
}

/// A payload the registry refused
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// HTTP status of the response (0 when not sent)
    pub status: u16,
    pub kind: RejectionKind,
    /// Human readable explanation taken from the OperationOutcome
    pub message: String,
    /// Raw response body
    pub body: Value,
}

impl Rejection {
    pub fn is_duplicate(&self) -> bool {
        self.kind == RejectionKind::Duplicate
    }

    /// Only a refused value blocks automatic resubmission; other refusals
    /// stay eligible for the next sweep.
    pub fn needs_upstream_fix(&self) -> bool {
        self.kind == RejectionKind::InvalidValue
    }
}

/// An accepted create or update
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    /// Non-empty registry id
    pub id: String,
    pub resource_type: String,
    pub body: Value,
}

/// Result of one registry write
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryResponse {
    Accepted(Accepted),
    Rejected(Rejection),
}

impl RegistryResponse {
    pub fn accepted_id(&self) -> Option<&str> {
        match self {
            RegistryResponse::Accepted(a) => Some(a.id.as_str()),
            RegistryResponse::Rejected(_) => None,
        }
    }
}

/// Remote FHIR registry
///
/// Every call is made on behalf of one hospital, whose credentials the
/// implementation resolves. Transport, authentication and 5xx failures are
/// returned as `Err`; refusals of the payload itself are
/// [`RegistryResponse::Rejected`].
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Creates a resource
    async fn create(
        &self,
        hospital: &HospitalId,
        resource_type: &str,
        payload: &Value,
    ) -> Result<RegistryResponse>;

    /// Overwrites the resource with the given id
    async fn update(
        &self,
        hospital: &HospitalId,
        resource_type: &str,
        id: &str,
        payload: &Value,
    ) -> Result<RegistryResponse>;

    /// Searches resources, returning the matched resources of the bundle
    async fn search(
        &self,
        hospital: &HospitalId,
        resource_type: &str,
        params: &[(String, String)],
    ) -> Result<Vec<Value>>;

    /// Name used in logs
    fn name(&self) -> &str;
}

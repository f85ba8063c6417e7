//! Domain error types
//!
//! This module defines the error hierarchy for MedBridge.
//! All errors are domain-specific and don't expose third-party types.
//!
//! Note that a registry *rejection* (an OperationOutcome returned for a
//! submitted payload) is not an error: it is a regular
//! [`RegistryResponse`](crate::adapters::registry::RegistryResponse) value.
//! The types here cover transport, storage and structural failures.

use thiserror::Error;

/// Main MedBridge error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Remote registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Datastore errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Inbound payload failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Notification sink errors
    #[error("Notification error: {0}")]
    Notification(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// A bounded operation ran out of time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl BridgeError {
    /// Whether a later sweep may succeed without any upstream change.
    ///
    /// Transport, authentication, timeout and 5xx failures are retryable.
    /// Validation and structural failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Registry(e) => e.is_retryable(),
            BridgeError::Store(StoreError::ConnectionFailed(_)) => true,
            BridgeError::Timeout(_) => true,
            _ => false,
        }
    }
}

/// Remote registry errors
///
/// Errors that occur while talking to the FHIR registry.
/// These errors don't expose third-party HTTP client types.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to connect to the registry
    #[error("Failed to connect to registry: {0}")]
    ConnectionFailed(String),

    /// Token acquisition or authorization failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Response could not be interpreted (missing id, bad JSON)
    #[error("Invalid response from registry: {0}")]
    InvalidResponse(String),

    /// Server error (5xx, 429)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Request timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// No credentials are configured for the hospital
    #[error("Unknown hospital: {0}")]
    UnknownHospital(String),

    /// The registry refused a payload on a path where a refusal is fatal
    #[error("Registry rejected the payload: {status} - {message}")]
    Rejected { status: u16, message: String },
}

impl RegistryError {
    /// Whether retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RegistryError::UnknownHospital(_) | RegistryError::Rejected { .. }
        )
    }
}

/// Datastore errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to reach the datastore
    #[error("Failed to connect to datastore: {0}")]
    ConnectionFailed(String),

    /// Query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Insert failed
    #[error("Failed to insert record: {0}")]
    InsertFailed(String),

    /// Update failed
    #[error("Failed to update record: {0}")]
    UpdateFailed(String),

    /// Unique key collision
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Stored document could not be decoded
    #[error("Failed to deserialize record: {0}")]
    DeserializationFailed(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::Configuration(format!("TOML parse error: {err}"))
    }
}

//! HTTP error body

use crate::domain::errors::{BridgeError, RegistryError, StoreError};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error returned by every handler, rendered as
/// `{"errorCode": ..., "errorMessage": ...}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error_code: &'a str,
    error_message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        let message = err.to_string();
        match err {
            BridgeError::Validation(_) | BridgeError::Serialization(_) => Self::bad_request(message),
            BridgeError::NotFound(_) => Self::not_found(message),
            BridgeError::Store(StoreError::Conflict(_)) => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", message)
            }
            BridgeError::Store(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", message)
            }
            BridgeError::Registry(RegistryError::UnknownHospital(_)) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "UNKNOWN_HOSPITAL", message)
            }
            BridgeError::Registry(_) => Self::new(StatusCode::BAD_GATEWAY, "REGISTRY_ERROR", message),
            BridgeError::Timeout(_) => Self::new(StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", message),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, code = self.code, error = %self.message, "Request failed");
        } else {
            tracing::debug!(status = %self.status, code = self.code, error = %self.message, "Request refused");
        }
        let body = ErrorBody {
            error_code: self.code,
            error_message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

//! Result type alias for MedBridge
//!
//! This module provides a convenient Result type alias that uses BridgeError
//! as the error type.

use super::errors::BridgeError;

/// Result type alias for MedBridge operations
///
/// # Examples
///
/// ```
/// use medbridge::domain::result::Result;
/// use medbridge::domain::errors::BridgeError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(BridgeError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, BridgeError>;

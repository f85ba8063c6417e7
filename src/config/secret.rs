//! Credentials held in configuration
//!
//! Hospital client secrets, cached registry access tokens and the
//! PostgreSQL connection string are kept as [`SecretString`]. The value is
//! zeroed on drop, redacted from `Debug` output and only reachable through
//! [`secrecy::ExposeSecret`].
//!
//! ```rust
//! use medbridge::config::secret_string;
//! use secrecy::ExposeSecret;
//!
//! let client_secret = secret_string("s3cr3t".to_string());
//! assert_eq!(client_secret.expose_secret().as_str(), "s3cr3t");
//! assert!(!format!("{client_secret:?}").contains("s3cr3t"));
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// String payload of a [`SecretString`]
#[derive(Clone, Debug, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl SecretValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue(s)
    }
}

impl PartialEq<str> for SecretValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl Serialize for SecretValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SecretValue)
    }
}

pub type SecretString = Secret<SecretValue>;

/// Wraps a plain value, typically one resolved from `${VAR}` or a
/// `MEDBRIDGE_*` override
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HospitalConfig;
    use secrecy::ExposeSecret;

    #[test]
    fn test_hospital_debug_hides_client_secret() {
        let hospital: HospitalConfig = toml::from_str(
            r#"
id = "rs-01"
organization_id = "100001"
client_id = "client-rs-01"
client_secret = "very-secret"
"#,
        )
        .unwrap();

        assert_eq!(hospital.client_secret.expose_secret(), "very-secret");
        let debug = format!("{hospital:?}");
        assert!(debug.contains("client-rs-01"));
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn test_token_value_survives_clone() {
        let token = secret_string("access-token".to_string());
        let copy = token.clone();
        drop(token);
        assert_eq!(copy.expose_secret().as_str(), "access-token");
    }
}

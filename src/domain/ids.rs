//! Domain identifier types with validation
//!
//! Newtype wrappers keep hospital-issued identifiers and locally generated
//! record ids from being mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Local encounter identifier
///
/// Generated by MedBridge when an encounter is first seen.
///
/// # Examples
///
/// ```
/// use medbridge::domain::ids::EncounterId;
/// use std::str::FromStr;
///
/// let id = EncounterId::from_str("7d44b88c-4199-4bad-97dc-d78268e01398").unwrap();
/// assert_eq!(id.as_str(), "7d44b88c-4199-4bad-97dc-d78268e01398");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EncounterId(String);

impl EncounterId {
    /// Creates a new EncounterId from a string
    ///
    /// # Returns
    ///
    /// Returns `Ok(EncounterId)` if the ID is valid, `Err` otherwise
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Encounter ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Generates a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the encounter ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EncounterId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Local identifier of a syncable item or chain child
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    /// Creates a new ItemId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Item ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Generates a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the item ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Hospital (facility) identifier
///
/// Selects the registry credentials and organization reference used for
/// every submission made on the hospital's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HospitalId(String);

impl HospitalId {
    /// Creates a new HospitalId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Hospital ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the hospital ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HospitalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HospitalId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for HospitalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hospital registration (visit) number
///
/// Unique per hospital. Together with [`HospitalId`] it is the secondary
/// key of an encounter and the identifier value sent to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrationId(String);

impl RegistrationId {
    /// Creates a new RegistrationId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Registration ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the registration ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RegistrationId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encounter_id_valid() {
        let id = EncounterId::new("enc-1").unwrap();
        assert_eq!(id.as_str(), "enc-1");
        assert_eq!(id.to_string(), "enc-1");
    }

    #[test]
    fn test_empty_ids_rejected() {
        assert!(EncounterId::new("").is_err());
        assert!(ItemId::new("   ").is_err());
        assert!(HospitalId::new("").is_err());
        assert!(RegistrationId::from_str("").is_err());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = EncounterId::generate();
        let b = EncounterId::generate();
        assert_ne!(a, b);
        assert_ne!(ItemId::generate(), ItemId::generate());
    }

    #[test]
    fn test_id_serde_is_transparent_string() {
        let id = HospitalId::new("RS-01").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"RS-01\"");
        let back: HospitalId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

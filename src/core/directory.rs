//! Hospital directory
//!
//! Resolves a hospital id to the organization it submits for and tells
//! whether submissions are enabled for it.

use crate::config::{BridgeConfig, HospitalConfig};
use crate::domain::errors::RegistryError;
use crate::domain::ids::HospitalId;
use crate::domain::Result;
use std::collections::HashMap;

/// Registry-facing identity of one hospital
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HospitalProfile {
    pub id: HospitalId,
    /// Organization id registered for the hospital
    pub organization_id: String,
    pub enabled: bool,
}

impl HospitalProfile {
    pub fn new(id: HospitalId, organization_id: impl Into<String>) -> Self {
        Self {
            id,
            organization_id: organization_id.into(),
            enabled: true,
        }
    }
}

/// Lookup of configured hospitals
#[derive(Debug, Clone, Default)]
pub struct HospitalDirectory {
    hospitals: HashMap<HospitalId, HospitalProfile>,
    identifier_system: String,
}

impl HospitalDirectory {
    pub fn new(
        profiles: impl IntoIterator<Item = HospitalProfile>,
        identifier_system: impl Into<String>,
    ) -> Self {
        Self {
            hospitals: profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
            identifier_system: identifier_system.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let profiles = config
            .hospitals
            .iter()
            .map(profile_from_config)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(profiles, &config.registry.identifier_system))
    }

    pub fn get(&self, id: &HospitalId) -> Option<&HospitalProfile> {
        self.hospitals.get(id)
    }

    /// Unknown hospitals are never enabled
    pub fn is_enabled(&self, id: &HospitalId) -> bool {
        self.get(id).is_some_and(|p| p.enabled)
    }

    /// The profile of a hospital that must be known
    pub fn require(&self, id: &HospitalId) -> Result<&HospitalProfile> {
        self.get(id)
            .ok_or_else(|| RegistryError::UnknownHospital(id.to_string()).into())
    }

    /// Base of every identifier system
    pub fn identifier_system(&self) -> &str {
        &self.identifier_system
    }

    /// Identifier system of encounters registered by an organization
    pub fn encounter_identifier_system(&self, organization_id: &str) -> String {
        format!("{}/encounter/{organization_id}", self.identifier_system)
    }

    pub fn len(&self) -> usize {
        self.hospitals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hospitals.is_empty()
    }
}

fn profile_from_config(hospital: &HospitalConfig) -> Result<HospitalProfile> {
    let id = HospitalId::new(hospital.id.clone())
        .map_err(crate::domain::BridgeError::Configuration)?;
    Ok(HospitalProfile {
        id,
        organization_id: hospital.organization_id.clone(),
        enabled: hospital.enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> HospitalDirectory {
        let mut disabled = HospitalProfile::new(HospitalId::new("H2").unwrap(), "org-2");
        disabled.enabled = false;
        HospitalDirectory::new(
            vec![
                HospitalProfile::new(HospitalId::new("H1").unwrap(), "org-1"),
                disabled,
            ],
            "http://sys-ids.kemkes.go.id/",
        )
    }

    #[test]
    fn test_enabled_lookup() {
        let dir = directory();
        assert!(dir.is_enabled(&HospitalId::new("H1").unwrap()));
        assert!(!dir.is_enabled(&HospitalId::new("H2").unwrap()));
        assert!(!dir.is_enabled(&HospitalId::new("H3").unwrap()));
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_require_unknown_hospital() {
        let err = directory()
            .require(&HospitalId::new("nope").unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("Unknown hospital"));
    }

    #[test]
    fn test_encounter_identifier_system() {
        assert_eq!(
            directory().encounter_identifier_system("org-1"),
            "http://sys-ids.kemkes.go.id/encounter/org-1"
        );
    }
}

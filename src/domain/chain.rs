//! Diagnostic chain stages
//!
//! A lab or radiology item is represented in the registry by up to four
//! linked resources. Each stage is stored as a [`ChainChild`] that points back
//! at its item through `ref_id`.

use crate::domain::encounter::SyncState;
use crate::domain::ids::ItemId;
use crate::domain::items::ItemKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic category of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticCategory {
    Lab,
    Rad,
}

impl DiagnosticCategory {
    pub fn from_kind(kind: ItemKind) -> Option<Self> {
        match kind {
            ItemKind::Lab => Some(DiagnosticCategory::Lab),
            ItemKind::Radiology => Some(DiagnosticCategory::Rad),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCategory::Lab => "lab",
            DiagnosticCategory::Rad => "rad",
        }
    }

    /// Ordered stages for this category; radiology has no specimen
    pub fn stages(&self) -> &'static [ChainStage] {
        match self {
            DiagnosticCategory::Lab => &[
                ChainStage::ServiceRequest,
                ChainStage::Specimen,
                ChainStage::Observation,
                ChainStage::DiagnosticReport,
            ],
            DiagnosticCategory::Rad => &[
                ChainStage::ServiceRequest,
                ChainStage::Observation,
                ChainStage::DiagnosticReport,
            ],
        }
    }
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One link of the diagnostic chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChainStage {
    ServiceRequest,
    Specimen,
    Observation,
    DiagnosticReport,
}

impl ChainStage {
    pub fn resource_type(&self) -> &'static str {
        match self {
            ChainStage::ServiceRequest => "ServiceRequest",
            ChainStage::Specimen => "Specimen",
            ChainStage::Observation => "Observation",
            ChainStage::DiagnosticReport => "DiagnosticReport",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainStage::ServiceRequest => "serviceRequest",
            ChainStage::Specimen => "specimen",
            ChainStage::Observation => "observation",
            ChainStage::DiagnosticReport => "diagnosticReport",
        }
    }
}

impl fmt::Display for ChainStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_type())
    }
}

/// Stored state of one chain stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainChild {
    pub id: ItemId,
    /// Back-reference to the owning diagnostic item (lookup only)
    pub ref_id: ItemId,
    pub category: DiagnosticCategory,
    pub stage: ChainStage,
    #[serde(default)]
    pub sync: SyncState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChainChild {
    pub fn new(ref_id: ItemId, category: DiagnosticCategory, stage: ChainStage) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::generate(),
            ref_id,
            category,
            stage,
            sync: SyncState::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Registry ids collected while walking a chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRefs {
    pub service_request: Option<String>,
    pub specimen: Option<String>,
    pub observation: Option<String>,
    pub diagnostic_report: Option<String>,
}

impl ChainRefs {
    pub fn get(&self, stage: ChainStage) -> Option<&str> {
        match stage {
            ChainStage::ServiceRequest => self.service_request.as_deref(),
            ChainStage::Specimen => self.specimen.as_deref(),
            ChainStage::Observation => self.observation.as_deref(),
            ChainStage::DiagnosticReport => self.diagnostic_report.as_deref(),
        }
    }

    pub fn set(&mut self, stage: ChainStage, id: impl Into<String>) {
        let id = Some(id.into());
        match stage {
            ChainStage::ServiceRequest => self.service_request = id,
            ChainStage::Specimen => self.specimen = id,
            ChainStage::Observation => self.observation = id,
            ChainStage::DiagnosticReport => self.diagnostic_report = id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radiology_skips_specimen() {
        assert!(!DiagnosticCategory::Rad
            .stages()
            .contains(&ChainStage::Specimen));
        assert_eq!(DiagnosticCategory::Lab.stages().len(), 4);
    }

    #[test]
    fn test_stages_end_with_report() {
        for category in [DiagnosticCategory::Lab, DiagnosticCategory::Rad] {
            assert_eq!(
                category.stages().last(),
                Some(&ChainStage::DiagnosticReport)
            );
            assert_eq!(category.stages().first(), Some(&ChainStage::ServiceRequest));
        }
    }

    #[test]
    fn test_category_from_kind() {
        assert_eq!(
            DiagnosticCategory::from_kind(ItemKind::Lab),
            Some(DiagnosticCategory::Lab)
        );
        assert_eq!(
            DiagnosticCategory::from_kind(ItemKind::Radiology),
            Some(DiagnosticCategory::Rad)
        );
        assert_eq!(DiagnosticCategory::from_kind(ItemKind::Allergy), None);
    }

    #[test]
    fn test_chain_refs() {
        let mut refs = ChainRefs::default();
        refs.set(ChainStage::Specimen, "sp-1");
        assert_eq!(refs.get(ChainStage::Specimen), Some("sp-1"));
        assert_eq!(refs.get(ChainStage::ServiceRequest), None);
    }
}

//! Clinical sub-resources attached to an encounter
//!
//! The inbound boundary accepts a closed set of tagged variants, one per
//! resource kind. Each variant knows its natural key, which is the stable
//! identity used to match a re-sent record against what is already stored.

use crate::domain::encounter::SyncState;
use crate::domain::ids::{EncounterId, ItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Resource kind handled by one sync pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Condition,
    Observation,
    Procedure,
    CarePlan,
    Prognosis,
    Allergy,
    Medication,
    Lab,
    Radiology,
}

impl ItemKind {
    /// Every kind, in cascade order
    pub const ALL: [ItemKind; 9] = [
        ItemKind::Observation,
        ItemKind::CarePlan,
        ItemKind::Procedure,
        ItemKind::Prognosis,
        ItemKind::Allergy,
        ItemKind::Medication,
        ItemKind::Condition,
        ItemKind::Lab,
        ItemKind::Radiology,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Condition => "condition",
            ItemKind::Observation => "observation",
            ItemKind::Procedure => "procedure",
            ItemKind::CarePlan => "careplan",
            ItemKind::Prognosis => "prognosis",
            ItemKind::Allergy => "allergy",
            ItemKind::Medication => "medication",
            ItemKind::Lab => "lab",
            ItemKind::Radiology => "radiology",
        }
    }

    /// FHIR resource type created for this kind.
    ///
    /// For chained kinds this is the terminal resource whose id the item mirrors.
    pub fn resource_type(&self) -> &'static str {
        match self {
            ItemKind::Condition => "Condition",
            ItemKind::Observation => "Observation",
            ItemKind::Procedure => "Procedure",
            ItemKind::CarePlan => "CarePlan",
            ItemKind::Prognosis => "ClinicalImpression",
            ItemKind::Allergy => "AllergyIntolerance",
            ItemKind::Medication => "Medication",
            ItemKind::Lab | ItemKind::Radiology => "DiagnosticReport",
        }
    }

    /// Submitted through the diagnostic chain rather than a single create
    pub fn is_chained(&self) -> bool {
        matches!(self, ItemKind::Lab | ItemKind::Radiology)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "condition" => Ok(ItemKind::Condition),
            "observation" => Ok(ItemKind::Observation),
            "procedure" => Ok(ItemKind::Procedure),
            "careplan" | "care-plan" | "care_plan" => Ok(ItemKind::CarePlan),
            "prognosis" => Ok(ItemKind::Prognosis),
            "allergy" => Ok(ItemKind::Allergy),
            "medication" => Ok(ItemKind::Medication),
            "lab" => Ok(ItemKind::Lab),
            "radiology" | "rad" => Ok(ItemKind::Radiology),
            other => Err(format!("Unknown item category '{other}'")),
        }
    }
}

/// Diagnosis recorded as a Condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionRecord {
    /// Medical-record id of the diagnosis row
    pub pmr_id: String,
    /// ICD-10 code
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Vital sign category, one Observation each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalSignCategory {
    HeartRate,
    RespiratoryRate,
    OxygenSaturation,
    BodyTemperature,
    SystolicBlood,
    DiastolicBlood,
}

impl VitalSignCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VitalSignCategory::HeartRate => "heart_rate",
            VitalSignCategory::RespiratoryRate => "respiratory_rate",
            VitalSignCategory::OxygenSaturation => "oxygen_saturation",
            VitalSignCategory::BodyTemperature => "body_temperature",
            VitalSignCategory::SystolicBlood => "systolic_blood",
            VitalSignCategory::DiastolicBlood => "diastolic_blood",
        }
    }

    /// LOINC code and display
    pub fn loinc(&self) -> (&'static str, &'static str) {
        match self {
            VitalSignCategory::HeartRate => ("8867-4", "Heart rate"),
            VitalSignCategory::RespiratoryRate => ("9279-1", "Respiratory rate"),
            VitalSignCategory::OxygenSaturation => ("20564-1", "Oxygen saturation in Blood"),
            VitalSignCategory::BodyTemperature => ("8310-5", "Body temperature"),
            VitalSignCategory::SystolicBlood => ("8480-6", "Systolic blood pressure"),
            VitalSignCategory::DiastolicBlood => ("8462-4", "Diastolic blood pressure"),
        }
    }

    /// UCUM unit (display, code)
    pub fn unit(&self) -> (&'static str, &'static str) {
        match self {
            VitalSignCategory::HeartRate | VitalSignCategory::RespiratoryRate => {
                ("beats/minute", "/min")
            }
            VitalSignCategory::OxygenSaturation => ("%", "%"),
            VitalSignCategory::BodyTemperature => ("C", "Cel"),
            VitalSignCategory::SystolicBlood | VitalSignCategory::DiastolicBlood => {
                ("mm[Hg]", "mm[Hg]")
            }
        }
    }
}

/// A single vital sign measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalSignRecord {
    pub category: VitalSignCategory,
    pub value: f64,
    #[serde(default)]
    pub measured_at: Option<DateTime<Utc>>,
}

/// ICD-9-CM procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureRecord {
    pub pmr_ref_id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub performed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Care plan derived from a planned procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarePlanRecord {
    pub procedure_uuid: String,
    #[serde(default)]
    pub procedure_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Prognosis recorded as a ClinicalImpression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrognosisRecord {
    pub pmr_prognosa_id: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Allergy category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllergyCategory {
    Food,
    #[default]
    Medication,
    Environment,
    Biologic,
}

impl AllergyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllergyCategory::Food => "food",
            AllergyCategory::Medication => "medication",
            AllergyCategory::Environment => "environment",
            AllergyCategory::Biologic => "biologic",
        }
    }
}

/// Allergy or intolerance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllergyRecord {
    pub pmr_allergy_id: String,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub category: AllergyCategory,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Ingredient of a compounded medication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub strength: Option<String>,
}

/// Medication receipt line, either a catalogue product or a compound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationRecord {
    pub pmr_receipt_id: String,
    /// Set for compounded ("racik") preparations
    #[serde(default)]
    pub concoction_id: Option<String>,
    #[serde(default)]
    pub compound: bool,
    /// KFA product code
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub dosage_instruction: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
}

/// Laboratory or radiology order with its result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticRecord {
    /// Medical-record uuid of the order line
    pub pmr_uuid: String,
    /// LOINC code of the examination
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub specimen_type: Option<String>,
    #[serde(default)]
    pub requested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
}

/// Inbound clinical record, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ClinicalItem {
    Condition(ConditionRecord),
    Observation(VitalSignRecord),
    Procedure(ProcedureRecord),
    CarePlan(CarePlanRecord),
    Prognosis(PrognosisRecord),
    Allergy(AllergyRecord),
    Medication(MedicationRecord),
    Lab(DiagnosticRecord),
    Radiology(DiagnosticRecord),
}

impl ClinicalItem {
    pub fn kind(&self) -> ItemKind {
        match self {
            ClinicalItem::Condition(_) => ItemKind::Condition,
            ClinicalItem::Observation(_) => ItemKind::Observation,
            ClinicalItem::Procedure(_) => ItemKind::Procedure,
            ClinicalItem::CarePlan(_) => ItemKind::CarePlan,
            ClinicalItem::Prognosis(_) => ItemKind::Prognosis,
            ClinicalItem::Allergy(_) => ItemKind::Allergy,
            ClinicalItem::Medication(_) => ItemKind::Medication,
            ClinicalItem::Lab(_) => ItemKind::Lab,
            ClinicalItem::Radiology(_) => ItemKind::Radiology,
        }
    }

    /// Stable identity of the record within its encounter and kind
    pub fn natural_key(&self) -> String {
        match self {
            ClinicalItem::Condition(r) => r.pmr_id.clone(),
            ClinicalItem::Observation(r) => r.category.as_str().to_string(),
            ClinicalItem::Procedure(r) => r.pmr_ref_id.clone(),
            ClinicalItem::CarePlan(r) => r.procedure_uuid.clone(),
            ClinicalItem::Prognosis(r) => r.pmr_prognosa_id.clone(),
            ClinicalItem::Allergy(r) => r.pmr_allergy_id.clone(),
            ClinicalItem::Medication(r) => match (&r.concoction_id, r.compound) {
                (Some(concoction), true) if !concoction.trim().is_empty() => concoction.clone(),
                _ => r.pmr_receipt_id.clone(),
            },
            ClinicalItem::Lab(r) | ClinicalItem::Radiology(r) => r.pmr_uuid.clone(),
        }
    }

    /// Structural checks applied at the inbound boundary
    pub fn validate(&self) -> Result<(), String> {
        if self.natural_key().trim().is_empty() {
            return Err(format!("{} record is missing its identifier", self.kind()));
        }
        match self {
            ClinicalItem::Condition(r) if r.code.trim().is_empty() => {
                Err(format!("condition {} has no diagnosis code", r.pmr_id))
            }
            ClinicalItem::Observation(r) if !r.value.is_finite() => Err(format!(
                "observation {} has a non-numeric value",
                r.category.as_str()
            )),
            ClinicalItem::Medication(r) if r.compound && r.ingredients.is_empty() => Err(format!(
                "compound medication {} has no ingredients",
                r.pmr_receipt_id
            )),
            _ => Ok(()),
        }
    }

    /// Whether the record carries enough data to be sent at all.
    ///
    /// Care plans without a procedure name and prognoses without a code are
    /// stored but never submitted.
    pub fn is_submittable(&self) -> bool {
        match self {
            ClinicalItem::CarePlan(r) => !r.procedure_name.trim().is_empty(),
            ClinicalItem::Prognosis(r) => r.code.as_deref().is_some_and(|c| !c.trim().is_empty()),
            _ => true,
        }
    }

    pub fn as_diagnostic(&self) -> Option<&DiagnosticRecord> {
        match self {
            ClinicalItem::Lab(r) | ClinicalItem::Radiology(r) => Some(r),
            _ => None,
        }
    }

    /// SHA-256 over the serialized domain fields, used to detect edits
    pub fn content_hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }
}

/// Stored sub-resource with its sync state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncableItem {
    pub id: ItemId,
    pub encounter_id: EncounterId,
    pub kind: ItemKind,
    pub natural_key: String,
    pub record: ClinicalItem,
    pub content_hash: String,
    #[serde(default)]
    pub sync: SyncState,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncableItem {
    /// New unsynced item for a record
    pub fn new(encounter_id: EncounterId, record: ClinicalItem) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::generate(),
            encounter_id,
            kind: record.kind(),
            natural_key: record.natural_key(),
            content_hash: record.content_hash(),
            record,
            sync: SyncState::default(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the domain fields, keeping identity and remote id.
    ///
    /// Returns `false` when the record is unchanged.
    pub fn apply_record(&mut self, record: ClinicalItem) -> bool {
        let hash = record.content_hash();
        if hash == self.content_hash {
            return false;
        }
        self.record = record;
        self.content_hash = hash;
        if self.sync.is_synced() {
            self.sync.pending_update = true;
        }
        // A changed value may fix what the registry rejected
        self.sync.needs_upstream_fix = false;
        self.updated_at = Utc::now();
        true
    }

    /// Takes the sync state of a submission made from `sent`.
    ///
    /// A record change stored while that submission was in flight is kept
    /// and marked for resubmission.
    pub fn merge_sync(&mut self, sent: &SyncableItem) {
        self.sync = sent.sync.clone();
        self.updated_at = sent.updated_at;
        if self.content_hash != sent.content_hash {
            self.sync.needs_upstream_fix = false;
            if self.sync.is_synced() {
                self.sync.pending_update = true;
            }
        }
    }

    /// Candidate for the next submit pass
    pub fn is_pending(&self) -> bool {
        self.active && self.record.is_submittable() && self.sync.needs_submission()
    }
}

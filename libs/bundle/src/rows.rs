//! Flat row types produced by normalization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row for the patient staging table, keyed by `case_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRow {
    pub case_id: String,
    pub sex: String,
    /// ISO date, exactly 10 characters after normalization.
    pub date_of_birth: String,
    pub deceased: Option<bool>,
    pub date_of_death: Option<String>,
    pub facility_id: String,
    pub clinic_number: Option<String>,
    /// Concatenated given + family name; empty when the source has no name.
    pub patient_name: String,
    pub phone_number: Option<String>,
}

/// One row for the encounter staging table, keyed by `encounter_id`.
///
/// `observations` starts as an empty JSON object and is filled by the linker
/// with an `obs_name` → observation-record mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterRow {
    pub patient_id: String,
    pub encounter_id: String,
    pub encounter_date: Option<String>,
    pub facility_id: String,
    pub encounter_type_code: String,
    #[serde(default = "empty_object")]
    pub observations: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl EncounterRow {
    pub fn new(
        patient_id: String,
        encounter_id: String,
        encounter_date: Option<String>,
        facility_id: String,
        encounter_type_code: String,
    ) -> Self {
        Self {
            patient_id,
            encounter_id,
            encounter_date,
            facility_id,
            encounter_type_code,
            observations: empty_object(),
        }
    }
}

/// A single normalized observation, joined onto its encounter by the linker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub id: Option<String>,
    pub patient_id: String,
    pub encounter_id: String,
    /// Code of the second entry in `code.coding`.
    pub code: String,
    /// Code of the first entry in `code.coding`.
    pub uuid: String,
    /// Display of the first entry in `code.coding`; the linker's map key.
    pub obs_name: String,
    /// Resolved scalar value (string, boolean, or number).
    pub value: Value,
    pub effective_datetime: Option<String>,
}

/// One queued unit of work: the normalized, linked rows for one inbound
/// Bundle. Immutable once enqueued; not retained after a successful write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    pub patients: Vec<PatientRow>,
    pub encounters: Vec<EncounterRow>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.patients.is_empty() && self.encounters.is_empty()
    }
}

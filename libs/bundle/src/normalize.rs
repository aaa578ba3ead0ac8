//! Bundle Normalizer: raw entries → typed staging rows.
//!
//! Per-record inclusion rules are data-quality filters. A record missing a
//! required field is dropped without an error; a missing nested field never
//! aborts extraction of the remaining entries.

use crate::entry::{is_truthy, resource_of, ResourceKind};
use crate::reference::local_id;
use crate::rows::{EncounterRow, ObservationRecord, PatientRow};
use serde_json::Value;

/// The three typed row lists produced from one Bundle's entries.
#[derive(Debug, Default)]
pub struct NormalizedBundle {
    pub patients: Vec<PatientRow>,
    pub encounters: Vec<EncounterRow>,
    pub observations: Vec<ObservationRecord>,
}

/// Convert raw heterogeneous entries into typed rows, applying per-record
/// inclusion rules. Entries of unrecognized resource types are ignored.
pub fn normalize(entries: &[Value]) -> NormalizedBundle {
    let mut out = NormalizedBundle::default();
    for entry in entries {
        let Some((kind, resource)) = resource_of(entry) else {
            continue;
        };
        match kind {
            ResourceKind::Patient => {
                if let Some(row) = extract_patient(resource) {
                    out.patients.push(row);
                }
            }
            ResourceKind::Encounter => {
                if let Some(row) = extract_encounter(resource) {
                    out.encounters.push(row);
                }
            }
            ResourceKind::Observation => {
                if let Some(record) = extract_observation(resource) {
                    out.observations.push(record);
                }
            }
        }
    }
    out
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn extract_patient(resource: &Value) -> Option<PatientRow> {
    let case_id = str_field(resource, "id").unwrap_or_default();
    let sex = str_field(resource, "gender").unwrap_or_default();
    let deceased = resource.get("deceasedBoolean").and_then(Value::as_bool);
    let date_of_death = str_field(resource, "deceasedDateTime").map(str::to_owned);

    // First identifier tagged as the HIV clinic number, if any.
    let clinic_number = resource
        .get("identifier")
        .and_then(Value::as_array)
        .and_then(|identifiers| {
            identifiers.iter().find(|identifier| {
                identifier
                    .get("type")
                    .and_then(|t| str_field(t, "text"))
                    .map(|text| text == "HIV Clinic No.")
                    .unwrap_or(false)
            })
        })
        .and_then(|identifier| str_field(identifier, "value"))
        .map(str::to_owned);

    let patient_name = resource
        .get("name")
        .and_then(Value::as_array)
        .and_then(|names| names.first())
        .map(|name| {
            let given = name
                .get("given")
                .and_then(Value::as_array)
                .and_then(|given| given.first())
                .and_then(Value::as_str)
                .unwrap_or_default();
            let family = str_field(name, "family").unwrap_or_default();
            format!("{given} {family}").trim().to_owned()
        })
        .unwrap_or_default();

    let phone_number = resource
        .get("telecom")
        .and_then(Value::as_array)
        .and_then(|telecom| telecom.first())
        .and_then(|contact| str_field(contact, "value"))
        .map(str::to_owned);

    let facility_id = resource
        .get("managingOrganization")
        .and_then(|org| str_field(org, "reference"))
        .and_then(local_id)
        .unwrap_or_default();

    // A bare birth year is widened to January 1st of that year.
    let raw_birth = str_field(resource, "birthDate").unwrap_or_default();
    let date_of_birth = if raw_birth.len() == 4 {
        format!("{raw_birth}-01-01")
    } else {
        raw_birth.to_owned()
    };

    let include = !case_id.is_empty()
        && date_of_birth.len() == 10
        && !sex.is_empty()
        && !facility_id.is_empty();
    if !include {
        return None;
    }

    Some(PatientRow {
        case_id: case_id.to_owned(),
        sex: sex.to_owned(),
        date_of_birth,
        deceased,
        date_of_death,
        facility_id: facility_id.to_owned(),
        clinic_number,
        patient_name,
        phone_number,
    })
}

fn extract_encounter(resource: &Value) -> Option<EncounterRow> {
    let types = resource.get("type").and_then(Value::as_array)?;
    if types.is_empty() {
        return None;
    }
    let encounter_id = str_field(resource, "id")?;
    let period = resource.get("period")?;
    let subject = resource.get("subject")?;
    let service_provider = resource.get("serviceProvider")?;

    let encounter_type_code = types
        .first()
        .and_then(|t| t.get("coding"))
        .and_then(Value::as_array)
        .and_then(|codings| codings.first())
        .and_then(|coding| str_field(coding, "code"))?;

    // `period` is required but its `start` may still be absent.
    let encounter_date = str_field(period, "start").map(str::to_owned);

    let patient_id = str_field(subject, "reference")
        .and_then(local_id)
        .unwrap_or_default();
    let facility_id = str_field(service_provider, "reference")
        .and_then(local_id)
        .unwrap_or_default();

    Some(EncounterRow::new(
        patient_id.to_owned(),
        encounter_id.to_owned(),
        encounter_date,
        facility_id.to_owned(),
        encounter_type_code.to_owned(),
    ))
}

/// Simple scalar value keys, checked left to right for the first truthy one.
const SCALAR_VALUE_KEYS: [&str; 5] = [
    "valueString",
    "valueBoolean",
    "valueInteger",
    "valueTime",
    "valueDateTime",
];

fn extract_observation(resource: &Value) -> Option<ObservationRecord> {
    let mut value = SCALAR_VALUE_KEYS
        .iter()
        .filter_map(|key| resource.get(*key))
        .find(|candidate| is_truthy(candidate))
        .cloned();

    // Quantity and codeable-concept values take priority over the simple
    // scalars. A present wrapper with a missing inner field clears the value,
    // and the record is dropped below.
    if let Some(quantity) = resource.get("valueQuantity") {
        value = quantity.get("value").cloned();
    }
    if let Some(concept) = resource.get("valueCodeableConcept") {
        value = concept
            .get("coding")
            .and_then(Value::as_array)
            .and_then(|codings| codings.first())
            .and_then(|coding| coding.get("display"))
            .cloned();
    }

    let value = value.filter(is_truthy)?;

    let encounter_id = resource.get("encounter").map(|encounter| {
        str_field(encounter, "reference")
            .and_then(local_id)
            .unwrap_or_default()
            .to_owned()
    })?;
    let patient_id = resource.get("subject").map(|subject| {
        str_field(subject, "reference")
            .and_then(local_id)
            .unwrap_or_default()
            .to_owned()
    })?;

    let codings = resource
        .get("code")
        .and_then(|code| code.get("coding"))
        .and_then(Value::as_array)?;
    if codings.len() < 2 {
        return None;
    }
    let obs_name = str_field(&codings[0], "display").unwrap_or_default();
    let uuid = str_field(&codings[0], "code").unwrap_or_default();
    let code = str_field(&codings[1], "code").unwrap_or_default();

    Some(ObservationRecord {
        id: str_field(resource, "id").map(str::to_owned),
        patient_id,
        encounter_id,
        code: code.to_owned(),
        uuid: uuid.to_owned(),
        obs_name: obs_name.to_owned(),
        value,
        effective_datetime: str_field(resource, "effectiveDateTime").map(str::to_owned),
    })
}

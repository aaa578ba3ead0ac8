//! Linker suites: observation → encounter joins.

use serde_json::{json, Value};
use silo_bundle::{link_observations, EncounterRow, ObservationRecord};

fn encounter(id: &str) -> EncounterRow {
    EncounterRow::new(
        "P1".into(),
        id.into(),
        Some("2021-06-01".into()),
        "F1".into(),
        "ART".into(),
    )
}

fn observation(encounter_id: &str, name: &str, value: Value) -> ObservationRecord {
    ObservationRecord {
        id: None,
        patient_id: "P1".into(),
        encounter_id: encounter_id.into(),
        code: "C1".into(),
        uuid: "U1".into(),
        obs_name: name.into(),
        value,
        effective_datetime: None,
    }
}

#[test]
fn maps_observations_by_name_onto_their_encounter() {
    let encounters = vec![encounter("E1")];
    let observations = vec![
        observation("E1", "BP", json!(120)),
        observation("E1", "HR", json!(72)),
        observation("E2", "BP", json!(999)),
    ];
    let linked = link_observations(encounters, &observations);
    let mapping = linked[0].observations.as_object().unwrap();
    assert_eq!(mapping.len(), 2);
    assert_eq!(mapping["BP"]["value"], json!(120));
    assert_eq!(mapping["HR"]["value"], json!(72));
}

#[test]
fn duplicate_names_are_last_write_wins() {
    let encounters = vec![encounter("E1")];
    let observations = vec![
        observation("E1", "BP", json!(120)),
        observation("E1", "BP", json!(130)),
    ];
    let linked = link_observations(encounters, &observations);
    let mapping = linked[0].observations.as_object().unwrap();
    assert_eq!(mapping.len(), 1);
    assert_eq!(mapping["BP"]["value"], json!(130));
}

#[test]
fn encounter_without_observations_gets_an_empty_mapping() {
    let linked = link_observations(vec![encounter("E1")], &[]);
    assert_eq!(linked[0].observations, json!({}));
}

#[test]
fn linking_is_idempotent_on_distinct_names() {
    let observations = vec![
        observation("E1", "BP", json!(120)),
        observation("E1", "HR", json!(72)),
    ];
    let once = link_observations(vec![encounter("E1")], &observations);
    let twice = link_observations(once.clone(), &observations);
    assert_eq!(once[0].observations, twice[0].observations);
}

#[test]
fn mapping_serializes_the_full_record() {
    let observations = vec![ObservationRecord {
        id: Some("O1".into()),
        effective_datetime: Some("2021-06-01T10:00:00Z".into()),
        ..observation("E1", "BP", json!(120))
    }];
    let linked = link_observations(vec![encounter("E1")], &observations);
    let record = &linked[0].observations["BP"];
    assert_eq!(record["id"], json!("O1"));
    assert_eq!(record["encounter_id"], json!("E1"));
    assert_eq!(record["patient_id"], json!("P1"));
    assert_eq!(record["code"], json!("C1"));
    assert_eq!(record["uuid"], json!("U1"));
    assert_eq!(record["effective_datetime"], json!("2021-06-01T10:00:00Z"));
}

//! Observation–Encounter Linker.

use crate::rows::{EncounterRow, ObservationRecord};
use serde_json::{Map, Value};

/// Join observations onto their owning encounter by `encounter_id`, attaching
/// an `obs_name` → observation-record JSON mapping to each encounter row.
///
/// Duplicate names within one encounter are last-write-wins in the input's
/// iteration order. Encounters with no matching observations carry an empty
/// mapping, not an absent column. Linking the same inputs twice produces the
/// same mapping.
pub fn link_observations(
    mut encounters: Vec<EncounterRow>,
    observations: &[ObservationRecord],
) -> Vec<EncounterRow> {
    for encounter in &mut encounters {
        let mut mapping = Map::new();
        for observation in observations
            .iter()
            .filter(|o| o.encounter_id == encounter.encounter_id)
        {
            let Ok(record) = serde_json::to_value(observation) else {
                continue;
            };
            mapping.insert(observation.obs_name.clone(), record);
        }
        encounter.observations = Value::Object(mapping);
    }
    encounters
}

//! Batch writer: idempotent bulk upserts into the staging schema.
//!
//! One job applies one batch: a patient upsert keyed by `case_id`, then an
//! encounter upsert keyed by `encounter_id`, sequentially on one pooled
//! connection. The encounter write only runs inside the non-empty-patients
//! branch; a batch with no patients writes nothing at all, including its
//! encounters. That nesting reproduces the behavior of the service this
//! pipeline replaces and is kept pending product-level clarification.

use crate::Result;
use silo_bundle::{Batch, EncounterRow, PatientRow};
use sqlx::{PgPool, Postgres, QueryBuilder};

#[derive(Clone)]
pub struct StagingStore {
    pool: PgPool,
}

impl StagingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply one normalized batch to the staging tables.
    ///
    /// Statement failures are logged and swallowed: the job is considered
    /// handled either way, and the two statements may partially succeed (no
    /// shared transaction). Only pool acquisition failure propagates, since
    /// retrying that is the queue's business, not the writer's.
    pub async fn apply(&self, batch: &Batch) -> Result<()> {
        let (write_patients, write_encounters) = statement_plan(batch);
        if !write_patients {
            tracing::debug!(
                encounters = batch.encounters.len(),
                "Batch has no patient rows; skipping staging writes"
            );
            return Ok(());
        }

        let mut conn = self.pool.acquire().await.map_err(crate::Error::Database)?;

        let mut query = patient_upsert(&batch.patients);
        match query.build().execute(&mut *conn).await {
            Ok(result) => tracing::info!(
                rows = result.rows_affected(),
                "Upserted patient staging rows"
            ),
            Err(e) => {
                tracing::error!("Patient staging upsert failed: {}", e);
                return Ok(());
            }
        }

        if !write_encounters {
            return Ok(());
        }

        let mut query = encounter_upsert(&batch.encounters);
        match query.build().execute(&mut *conn).await {
            Ok(result) => tracing::info!(
                rows = result.rows_affected(),
                "Upserted encounter staging rows"
            ),
            Err(e) => tracing::error!("Encounter staging upsert failed: {}", e),
        }

        Ok(())
    }
}

/// Which of the two statements a batch will execute. The encounter write is
/// nested inside the patient branch.
fn statement_plan(batch: &Batch) -> (bool, bool) {
    let write_patients = !batch.patients.is_empty();
    let write_encounters = write_patients && !batch.encounters.is_empty();
    (write_patients, write_encounters)
}

fn patient_upsert(rows: &[PatientRow]) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::new(
        "INSERT INTO staging_patient \
         (case_id, sex, date_of_birth, deceased, date_of_death, facility_id, \
          clinic_number, patient_name, phone_number) ",
    );
    query.push_values(rows, |mut b, row| {
        b.push_bind(&row.case_id)
            .push_bind(&row.sex)
            .push_bind(&row.date_of_birth)
            .push_bind(row.deceased)
            .push_bind(&row.date_of_death)
            .push_bind(&row.facility_id)
            .push_bind(&row.clinic_number)
            .push_bind(&row.patient_name)
            .push_bind(&row.phone_number);
    });
    query.push(
        " ON CONFLICT (case_id) DO UPDATE SET \
         sex = EXCLUDED.sex, \
         date_of_birth = EXCLUDED.date_of_birth, \
         deceased = EXCLUDED.deceased, \
         date_of_death = EXCLUDED.date_of_death, \
         facility_id = EXCLUDED.facility_id, \
         clinic_number = EXCLUDED.clinic_number, \
         patient_name = EXCLUDED.patient_name, \
         phone_number = EXCLUDED.phone_number, \
         updated_at = now()",
    );
    query
}

fn encounter_upsert(rows: &[EncounterRow]) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::new(
        "INSERT INTO staging_patient_encounters \
         (case_id, encounter_id, encounter_date, facility_id, encounter_type, observations) ",
    );
    query.push_values(rows, |mut b, row| {
        b.push_bind(&row.patient_id)
            .push_bind(&row.encounter_id)
            .push_bind(&row.encounter_date)
            .push_bind(&row.facility_id)
            .push_bind(&row.encounter_type_code)
            .push_bind(&row.observations);
    });
    query.push(
        " ON CONFLICT (encounter_id) DO UPDATE SET \
         case_id = EXCLUDED.case_id, \
         encounter_date = EXCLUDED.encounter_date, \
         facility_id = EXCLUDED.facility_id, \
         encounter_type = EXCLUDED.encounter_type, \
         observations = EXCLUDED.observations, \
         updated_at = now()",
    );
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient() -> PatientRow {
        PatientRow {
            case_id: "P1".into(),
            sex: "F".into(),
            date_of_birth: "1980-01-01".into(),
            deceased: None,
            date_of_death: None,
            facility_id: "F1".into(),
            clinic_number: None,
            patient_name: String::new(),
            phone_number: None,
        }
    }

    fn encounter() -> EncounterRow {
        EncounterRow::new(
            "P1".into(),
            "E1".into(),
            Some("2021-06-01".into()),
            "F1".into(),
            "ART".into(),
        )
    }

    #[test]
    fn both_statements_run_for_a_full_batch() {
        let batch = Batch {
            patients: vec![patient()],
            encounters: vec![encounter()],
        };
        assert_eq!(statement_plan(&batch), (true, true));
    }

    #[test]
    fn encounters_without_patients_write_nothing() {
        // The encounter write is nested inside the patient branch; a batch
        // with zero patients executes zero statements.
        let batch = Batch {
            patients: vec![],
            encounters: vec![encounter()],
        };
        assert_eq!(statement_plan(&batch), (false, false));
    }

    #[test]
    fn patients_alone_skip_the_encounter_statement() {
        let batch = Batch {
            patients: vec![patient()],
            encounters: vec![],
        };
        assert_eq!(statement_plan(&batch), (true, false));
    }

    #[test]
    fn patient_upsert_overwrites_on_case_id_conflict() {
        let rows = vec![patient()];
        let mut query = patient_upsert(&rows);
        let sql = query.sql();
        assert!(sql.starts_with("INSERT INTO staging_patient "));
        assert!(sql.contains("ON CONFLICT (case_id) DO UPDATE SET"));
        assert!(sql.contains("sex = EXCLUDED.sex"));
        assert!(sql.contains("updated_at = now()"));
    }

    #[test]
    fn encounter_upsert_overwrites_on_encounter_id_conflict() {
        let mut row = encounter();
        row.observations = json!({ "BP": { "value": 120 } });
        let rows = vec![row];
        let mut query = encounter_upsert(&rows);
        let sql = query.sql();
        assert!(sql.starts_with("INSERT INTO staging_patient_encounters "));
        assert!(sql.contains("ON CONFLICT (encounter_id) DO UPDATE SET"));
        assert!(sql.contains("observations = EXCLUDED.observations"));
    }

    #[test]
    fn patient_upsert_emits_one_placeholder_tuple_per_row() {
        let rows = vec![patient(), {
            let mut second = patient();
            second.case_id = "P2".into();
            second
        }];
        let mut query = patient_upsert(&rows);
        // 9 columns x 2 rows
        assert_eq!(query.sql().matches('$').count(), 18);
    }
}

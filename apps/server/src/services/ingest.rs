//! Bundle ingestion service.
//!
//! Normalizes an incoming FHIR document synchronously, then enqueues exactly
//! one staging job carrying the full batch. The HTTP caller gets a receipt
//! with the job id; the actual database writes happen in the worker.

use crate::{
    queue::{JobPriority, JobQueue, STAGE_BATCH_JOB_TYPE},
    Result,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use silo_bundle::{link_observations, normalize, Batch};
use std::sync::Arc;
use uuid::Uuid;

/// Acknowledgement returned to the submitter before any row is written.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub job_id: Uuid,
    pub patients: usize,
    pub encounters: usize,
    pub observations: usize,
}

pub struct IngestService {
    job_queue: Arc<dyn JobQueue>,
}

impl IngestService {
    pub fn new(job_queue: Arc<dyn JobQueue>) -> Self {
        Self { job_queue }
    }

    /// Normalize one bundle document and enqueue its staging batch.
    ///
    /// Runs the full pipeline in the request task: bucket the entries,
    /// flatten the rows, join observations onto their encounters, then hand
    /// the batch to the queue. A document whose every entry is excluded still
    /// produces a job; the worker treats the empty batch as a no-op.
    pub async fn submit_bundle(&self, document: &JsonValue) -> Result<IngestReceipt> {
        let entries = document
            .get("entry")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| {
                crate::Error::Validation("Bundle must contain an 'entry' array".to_string())
            })?;

        let normalized = normalize(entries);
        let observation_count = normalized.observations.len();
        let encounters = link_observations(normalized.encounters, &normalized.observations);

        let batch = Batch {
            patients: normalized.patients,
            encounters,
        };

        let patients = batch.patients.len();
        let encounters = batch.encounters.len();

        let parameters = serde_json::to_value(&batch).map_err(|e| {
            crate::Error::Internal(format!("Failed to serialize staging batch: {}", e))
        })?;

        let job_id = self
            .job_queue
            .enqueue(
                STAGE_BATCH_JOB_TYPE.to_string(),
                parameters,
                JobPriority::Normal,
                None,
            )
            .await?;

        tracing::info!(
            %job_id,
            patients,
            encounters,
            observations = observation_count,
            "Queued staging batch"
        );

        Ok(IngestReceipt {
            job_id,
            patients,
            encounters,
            observations: observation_count,
        })
    }
}

//! Staging batch worker.

use super::base::{Worker, WorkerConfig};
use crate::{
    db::StagingStore,
    queue::{Job, JobQueue, STAGE_BATCH_JOB_TYPE},
    Result,
};
use async_trait::async_trait;
use silo_bundle::Batch;
use std::sync::Arc;

pub struct StagingWorker {
    job_queue: Arc<dyn JobQueue>,
    staging_store: StagingStore,
    config: WorkerConfig,
}

impl StagingWorker {
    pub fn new(
        job_queue: Arc<dyn JobQueue>,
        staging_store: StagingStore,
        config: WorkerConfig,
    ) -> Self {
        Self {
            job_queue,
            staging_store,
            config,
        }
    }
}

#[async_trait]
impl Worker for StagingWorker {
    fn name(&self) -> &str {
        "StagingWorker"
    }

    fn supported_job_types(&self) -> &[&str] {
        &[STAGE_BATCH_JOB_TYPE]
    }

    fn max_concurrent_jobs(&self) -> usize {
        self.config.max_concurrent_jobs
    }

    async fn process_job(&self, job: Job) -> Result<()> {
        tracing::info!("{} processing job: {}", self.name(), job.id);

        // A payload that does not decode can never succeed later, so fail it
        // without queue-level retries.
        let batch: Batch = match serde_json::from_value(job.parameters.clone()) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(job_id = %job.id, "Malformed staging batch payload: {}", e);
                self.job_queue
                    .fail_job(job.id, format!("Malformed batch payload: {}", e), false)
                    .await?;
                return Ok(());
            }
        };

        let total = (batch.patients.len() + batch.encounters.len()) as i32;

        self.staging_store.apply(&batch).await?;

        self.job_queue
            .update_progress(job.id, total, Some(total), None)
            .await?;
        self.job_queue
            .complete_job(
                job.id,
                Some(serde_json::json!({
                    "patients": batch.patients.len(),
                    "encounters": batch.encounters.len(),
                })),
            )
            .await?;

        tracing::info!(
            job_id = %job.id,
            patients = batch.patients.len(),
            encounters = batch.encounters.len(),
            "{} completed job",
            self.name()
        );

        Ok(())
    }
}

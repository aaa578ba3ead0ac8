//! Inline (in-process) job queue implementation.
//!
//! This queue executes supported jobs immediately in the caller's task instead
//! of persisting them and relying on background workers.
//!
//! Primary use-case: deterministic integration tests that need staged rows to
//! be visible before a response is observed.

use super::{Job, JobPriority, JobQueue, JobStatus, RetryPolicy, STAGE_BATCH_JOB_TYPE};
use crate::{db::StagingStore, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use silo_bundle::Batch;
use sqlx::PgPool;
use std::{collections::HashMap, sync::Mutex};
use uuid::Uuid;

/// Inline job queue that runs supported jobs synchronously.
pub struct InlineJobQueue {
    staging: StagingStore,
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl InlineJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            staging: StagingStore::new(pool),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    async fn run_stage_batch(&self, job_id: Uuid, parameters: serde_json::Value) -> Result<()> {
        let batch: Batch = serde_json::from_value(parameters).map_err(|e| {
            crate::Error::Internal(format!("Failed to parse job parameters: {}", e))
        })?;

        let total = (batch.patients.len() + batch.encounters.len()) as i32;
        self.staging.apply(&batch).await?;

        self.update_progress(job_id, total, Some(total), None).await?;
        self.complete_job(job_id, None).await?;

        Ok(())
    }

    fn insert_job(&self, job: Job) {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(job.id, job);
    }

    fn update_job<F>(&self, job_id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&job_id) {
            f(job);
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for InlineJobQueue {
    async fn enqueue(
        &self,
        job_type: String,
        parameters: serde_json::Value,
        priority: JobPriority,
        retry_policy: Option<RetryPolicy>,
    ) -> Result<Uuid> {
        let job_id = Uuid::new_v4();
        let now = Utc::now();
        let retry_policy_json =
            serde_json::to_value(retry_policy.unwrap_or_default()).map_err(|e| {
                crate::Error::Internal(format!("Failed to serialize retry policy: {}", e))
            })?;

        let job = Job {
            id: job_id,
            job_type: job_type.clone(),
            status: JobStatus::Running.as_str().to_string(),
            priority: priority as i32,
            parameters: parameters.clone(),
            progress: None,
            retry_policy: retry_policy_json,
            retry_count: 0,
            processed_items: 0,
            total_items: None,
            error_message: None,
            last_error_at: None,
            scheduled_at: None,
            created_at: now,
            started_at: Some(now),
            completed_at: None,
            worker_id: Some("inline".to_string()),
        };
        self.insert_job(job);

        let result = match job_type.as_str() {
            STAGE_BATCH_JOB_TYPE => self.run_stage_batch(job_id, parameters).await,
            // Unsupported jobs are treated as no-ops in inline mode.
            _ => {
                self.complete_job(job_id, None).await?;
                Ok(())
            }
        };

        if let Err(e) = result {
            let _ = self
                .fail_job(job_id, format!("Inline job failed: {}", e), false)
                .await;
            return Err(e);
        }

        Ok(job_id)
    }

    async fn dequeue(&self, _job_types: &[String], _worker_id: &str) -> Result<Option<Job>> {
        Ok(None)
    }

    async fn listen<'a>(&'a self, _job_types: &'a [String]) -> Result<BoxStream<'a, Result<Job>>> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.get(&job_id).cloned())
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        processed_items: i32,
        total_items: Option<i32>,
        progress_data: Option<serde_json::Value>,
    ) -> Result<()> {
        self.update_job(job_id, |job| {
            job.processed_items = processed_items;
            if let Some(total) = total_items {
                job.total_items = Some(total);
            }
            if progress_data.is_some() {
                job.progress = progress_data;
            }
        })
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        final_results: Option<serde_json::Value>,
    ) -> Result<()> {
        let now = Utc::now();
        self.update_job(job_id, |job| {
            job.status = JobStatus::Completed.as_str().to_string();
            job.completed_at = Some(now);
            if final_results.is_some() {
                job.progress = final_results;
            }
        })
    }

    async fn fail_job(&self, job_id: Uuid, error_message: String, _retry: bool) -> Result<()> {
        let now = Utc::now();
        self.update_job(job_id, |job| {
            job.status = JobStatus::Failed.as_str().to_string();
            job.error_message = Some(error_message);
            job.last_error_at = Some(now);
            job.completed_at = Some(now);
        })
    }

    async fn health_check(&self) -> Result<serde_json::Value> {
        let jobs = self.jobs.lock().unwrap();
        Ok(serde_json::json!({
            "type": "inline",
            "jobs": jobs.len(),
        }))
    }
}

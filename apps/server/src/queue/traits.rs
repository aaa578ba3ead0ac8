//! Job queue trait definition

use super::models::*;
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

/// Abstract interface for job queue implementations
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a new job
    async fn enqueue(
        &self,
        job_type: String,
        parameters: serde_json::Value,
        priority: JobPriority,
        retry_policy: Option<RetryPolicy>,
    ) -> Result<Uuid>;

    /// Dequeue the next available job
    async fn dequeue(&self, job_types: &[String], worker_id: &str) -> Result<Option<Job>>;

    /// Listen for new jobs (streaming interface)
    /// Returns a stream of jobs matching the specified types
    async fn listen<'a>(&'a self, job_types: &'a [String]) -> Result<BoxStream<'a, Result<Job>>>;

    /// Get job by ID
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Update job progress
    async fn update_progress(
        &self,
        job_id: Uuid,
        processed_items: i32,
        total_items: Option<i32>,
        progress_data: Option<serde_json::Value>,
    ) -> Result<()>;

    /// Mark job as completed
    async fn complete_job(
        &self,
        job_id: Uuid,
        final_results: Option<serde_json::Value>,
    ) -> Result<()>;

    /// Mark job as failed and optionally schedule retry
    async fn fail_job(&self, job_id: Uuid, error_message: String, retry: bool) -> Result<()>;

    /// Health check
    async fn health_check(&self) -> Result<serde_json::Value>;
}

//! Worker trait and shared worker configuration.

use crate::{queue::Job, Result};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub max_concurrent_jobs: usize,
    pub poll_interval_seconds: u64,
}

/// A background worker bound to a set of job types.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    fn supported_job_types(&self) -> &[&str];

    /// Upper bound on jobs this worker processes at once.
    fn max_concurrent_jobs(&self) -> usize {
        1
    }

    async fn start(&self) -> Result<()> {
        tracing::info!("{} starting...", self.name());
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        tracing::info!("{} stopping...", self.name());
        Ok(())
    }

    /// Process one claimed job. Returning an error marks the job failed; the
    /// runner decides whether the queue should retry it.
    async fn process_job(&self, job: Job) -> Result<()>;
}

//! Background workers that process jobs from the queue.

pub mod base;
pub mod runner;
pub mod staging_worker;
pub mod state;

pub use base::{Worker, WorkerConfig};
pub use runner::{spawn_workers_with_config, WorkerRunnerConfig};
pub use staging_worker::StagingWorker;
pub use state::WorkerState;

use crate::Result;
use std::sync::Arc;

/// Build the set of workers this deployment runs.
pub fn create_workers(state: &WorkerState, config: WorkerConfig) -> Result<Vec<Arc<dyn Worker>>> {
    let staging = StagingWorker::new(
        state.job_queue.clone(),
        state.staging_store.clone(),
        config,
    );

    Ok(vec![Arc::new(staging)])
}

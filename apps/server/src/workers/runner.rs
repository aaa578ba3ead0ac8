//! Worker run loop: claim jobs from the queue stream and dispatch them.
//!
//! Each worker runs in its own task. When the queue stream breaks (listener
//! connection lost), the loop reconnects with jittered exponential backoff
//! instead of exiting, so a database restart does not kill the worker fleet.

use super::base::Worker;
use crate::{config::WorkersConfig, queue::JobQueue, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct WorkerRunnerConfig {
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    pub jitter_ratio: f64,
}

impl WorkerRunnerConfig {
    pub fn from_config(config: &WorkersConfig) -> Self {
        Self {
            reconnect_initial: Duration::from_secs(config.reconnect_initial_seconds.max(1)),
            reconnect_max: Duration::from_secs(config.reconnect_max_seconds.max(1)),
            jitter_ratio: config.reconnect_jitter_ratio,
        }
    }
}

impl Default for WorkerRunnerConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(60),
            jitter_ratio: 0.2,
        }
    }
}

/// Spawn one run-loop task per worker. Returns the join handles; send `true`
/// on the shutdown channel to stop the loops after their in-flight jobs.
pub fn spawn_workers_with_config(
    workers: Vec<Arc<dyn Worker>>,
    job_queue: Arc<dyn JobQueue>,
    config: WorkerRunnerConfig,
    shutdown: Option<watch::Receiver<bool>>,
) -> Vec<JoinHandle<Result<()>>> {
    workers
        .into_iter()
        .map(|worker| {
            let queue = job_queue.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(run_worker(worker, queue, config, shutdown))
        })
        .collect()
}

async fn run_worker(
    worker: Arc<dyn Worker>,
    job_queue: Arc<dyn JobQueue>,
    config: WorkerRunnerConfig,
    mut shutdown: Option<watch::Receiver<bool>>,
) -> Result<()> {
    worker.start().await?;

    let job_types: Vec<String> = worker
        .supported_job_types()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let max_concurrent = worker_concurrency(worker.as_ref());
    let semaphore = Arc::new(Semaphore::new(max_concurrent));

    let mut retry_delay = config.reconnect_initial;

    'outer: loop {
        if shutdown_requested(&shutdown) {
            break;
        }

        let mut stream = match job_queue.listen(&job_types).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(
                    worker = worker.name(),
                    "Job stream unavailable: {} (retrying in {:?})",
                    e,
                    retry_delay
                );
                if wait_or_shutdown(jittered_duration(retry_delay, config.jitter_ratio), &mut shutdown)
                    .await
                {
                    break;
                }
                retry_delay = (retry_delay * 2).min(config.reconnect_max);
                continue;
            }
        };

        retry_delay = config.reconnect_initial;

        loop {
            let next = if let Some(rx) = shutdown.as_mut() {
                tokio::select! {
                    item = stream.next() => item,
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break 'outer;
                        }
                        continue;
                    }
                }
            } else {
                stream.next().await
            };

            match next {
                Some(Ok(job)) => {
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break 'outer,
                    };
                    let worker = worker.clone();
                    let queue = job_queue.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        let job_id = job.id;
                        if let Err(e) = worker.process_job(job).await {
                            tracing::error!(
                                worker = worker.name(),
                                %job_id,
                                "Job processing failed: {}",
                                e
                            );
                            if let Err(fail_err) =
                                queue.fail_job(job_id, e.to_string(), true).await
                            {
                                tracing::error!(
                                    %job_id,
                                    "Failed to record job failure: {}",
                                    fail_err
                                );
                            }
                        }
                    });
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        worker = worker.name(),
                        "Job stream error: {} (reconnecting)",
                        e
                    );
                    break;
                }
                None => {
                    tracing::warn!(worker = worker.name(), "Job stream ended (reconnecting)");
                    break;
                }
            }
        }
    }

    // Drain in-flight jobs before reporting stopped.
    let _ = semaphore.acquire_many(max_concurrent as u32).await;
    worker.stop().await?;
    Ok(())
}

fn worker_concurrency(worker: &dyn Worker) -> usize {
    worker.max_concurrent_jobs().max(1)
}

fn shutdown_requested(shutdown: &Option<watch::Receiver<bool>>) -> bool {
    shutdown.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Sleep for `delay`, returning true if shutdown was requested meanwhile.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut Option<watch::Receiver<bool>>) -> bool {
    match shutdown.as_mut() {
        Some(rx) => tokio::select! {
            _ = tokio::time::sleep(delay) => *rx.borrow(),
            _ = rx.changed() => *rx.borrow(),
        },
        None => {
            tokio::time::sleep(delay).await;
            false
        }
    }
}

pub(crate) fn jittered_duration(base: Duration, jitter_ratio: f64) -> Duration {
    if base.is_zero() || jitter_ratio <= 0.0 {
        return base;
    }

    let bytes = *Uuid::new_v4().as_bytes();
    let value = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
    let unit = (value as f64) / (u64::MAX as f64); // [0,1]
    let signed = unit * 2.0 - 1.0; // [-1,1]
    let factor = (1.0 + signed * jitter_ratio).max(0.0);
    base.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_ratio() {
        let base = Duration::from_secs(10);
        for _ in 0..50 {
            let jittered = jittered_duration(base, 0.2);
            assert!(jittered >= Duration::from_secs(8));
            assert!(jittered <= Duration::from_secs(12));
        }
    }

    #[test]
    fn zero_ratio_is_identity() {
        let base = Duration::from_secs(7);
        assert_eq!(jittered_duration(base, 0.0), base);
    }

    #[test]
    fn runner_config_floors_reconnect_delays() {
        let config = WorkerRunnerConfig::from_config(&crate::config::WorkersConfig {
            enabled: true,
            embedded: false,
            poll_interval_seconds: 5,
            max_concurrent_jobs: 4,
            reconnect_initial_seconds: 0,
            reconnect_max_seconds: 0,
            reconnect_jitter_ratio: 0.2,
        });
        assert_eq!(config.reconnect_initial, Duration::from_secs(1));
        assert_eq!(config.reconnect_max, Duration::from_secs(1));
    }
}

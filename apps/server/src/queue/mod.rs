//! Asynchronous job queue.
//!
//! One named work queue carries staging batches from the ingest path to the
//! batch-writing workers. The Postgres implementation is the production
//! backend; the inline implementation runs jobs in the caller's task for
//! deterministic tests.

pub mod helpers;
pub mod inline;
pub mod models;
pub mod postgres;
pub mod traits;

pub use inline::InlineJobQueue;
pub use models::{Job, JobPriority, JobStatus, RetryPolicy};
pub use postgres::PostgresJobQueue;
pub use traits::JobQueue;

/// Job type carried on the staging work queue: one normalized batch per
/// inbound Bundle submission.
pub const STAGE_BATCH_JOB_TYPE: &str = "stage_batch";
